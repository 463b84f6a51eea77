// Copyright © 2018 Cormac O'Brien
//
// Permission is hereby granted, free of charge, to any person obtaining a copy of this software
// and associated documentation files (the "Software"), to deal in the Software without
// restriction, including without limitation the rights to use, copy, modify, merge, publish,
// distribute, sublicense, and/or sell copies of the Software, and to permit persons to whom the
// Software is furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all copies or
// substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR IMPLIED, INCLUDING
// BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY, FITNESS FOR A PARTICULAR PURPOSE AND
// NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM,
// DAMAGES OR OTHER LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE SOFTWARE.

//! Level entity parsing.
//!
//! Entities are stored as blocks of quoted key/value pairs:
//!
//! ```text
//! {
//! "classname" "worldspawn"
//! "wad" "gfx/base.wad"
//! }
//! {
//! "classname" "light"
//! "origin" "0 0 64"
//! }
//! ```
//!
//! Anything outside a block is skipped. A block that runs into malformed input keeps the pairs
//! read before the problem; the rest of the block is dropped and scanning carries on.

use std::sync::Arc;

use crate::{
    alloc::{Allocator, Block},
    bsp::BspError,
    parse::{quoted, space},
    util,
};

const ENTITY_CAPACITY: usize = 16;
const PROPERTY_CAPACITY: usize = 8;

/// A key/value pair. Both halves are kept as the raw bytes found between the quotes.
#[derive(Debug)]
pub struct Property {
    key: Block<u8>,
    value: Block<u8>,
}

impl Property {
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }
}

#[derive(Debug)]
pub struct Entity {
    properties: Block<Property>,
}

impl Entity {
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    pub fn properties(&self) -> &[Property] {
        &self.properties
    }

    pub fn property(&self, index: usize) -> Option<&Property> {
        self.properties.get(index)
    }

    /// Return the value of the first property whose key matches `key` exactly.
    pub fn get<K>(&self, key: K) -> Option<&[u8]>
    where
        K: AsRef<[u8]>,
    {
        let key = key.as_ref();
        self.properties
            .iter()
            .find(|p| p.key() == key)
            .map(|p| p.value())
    }
}

/// Where scanning stopped inside a block.
enum Stop<'a> {
    /// The block ended; scanning resumes from the remaining input.
    Block(&'a [u8]),
    /// A quote was never closed. Nothing after it can be paired up.
    Text,
}

// "key" or "value", preceded by any amount of whitespace
fn string(input: &[u8]) -> Result<(&[u8], &[u8]), Stop<'_>> {
    let (input, _) = space(input).map_err(|_| Stop::Block(input))?;

    match quoted(input) {
        Ok(r) => Ok(r),
        Err(_) if input.first() == Some(&b'"') => Err(Stop::Text),
        Err(_) => Err(Stop::Block(input)),
    }
}

// the body of a block, after the opening brace
fn entity<'a>(
    input: &'a [u8],
    alloc: &Arc<dyn Allocator>,
) -> Result<(Option<&'a [u8]>, Entity), BspError> {
    let mut properties = Block::with_capacity(alloc.clone(), PROPERTY_CAPACITY)?;
    let mut input = input;

    let rest = loop {
        if input.first() == Some(&b'}') {
            break Some(&input[1..]);
        }

        let (rest, key) = match string(input) {
            Ok(r) => r,
            Err(Stop::Block(rest)) => {
                if rest.first() == Some(&b'}') {
                    break Some(&rest[1..]);
                }

                if !rest.is_empty() {
                    warn!("Entity block ended by unexpected byte 0x{:02x}", rest[0]);
                }

                break Some(rest);
            }
            Err(Stop::Text) => {
                warn!("Unterminated key string in entity block");
                break None;
            }
        };

        let key = Block::from_slice(alloc.clone(), key)?;

        let (rest, value) = match string(rest) {
            Ok(r) => r,
            Err(stop) => {
                warn!(
                    "Dropping key \"{}\" with no value",
                    String::from_utf8_lossy(&key)
                );

                match stop {
                    Stop::Block(rest) => break Some(rest),
                    Stop::Text => break None,
                }
            }
        };

        let value = Block::from_slice(alloc.clone(), value)?;
        properties.push(Property { key, value })?;

        input = match space(rest) {
            Ok((rest, _)) => rest,
            Err(_) => rest,
        };
    };

    Ok((rest, Entity { properties }))
}

/// Parse every entity block in `text`.
///
/// Scanning ends at the first zero byte in `text`. Malformed blocks are truncated rather than
/// rejected; the only error is an allocation failure.
pub fn entities(text: &[u8], alloc: &Arc<dyn Allocator>) -> Result<Block<Entity>, BspError> {
    let mut entities = Block::with_capacity(alloc.clone(), ENTITY_CAPACITY)?;
    let mut input = util::trim_nul(text);

    while let Some((&b, rest)) = input.split_first() {
        if b != b'{' {
            input = rest;
            continue;
        }

        let (rest, entity) = entity(rest, alloc)?;
        entities.push(entity)?;

        match rest {
            Some(r) => input = r,
            None => break,
        }
    }

    Ok(entities)
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::{alloc::CountingAllocator, bsp::BspErrorKind};

    fn parse(text: &[u8]) -> Block<Entity> {
        let alloc: Arc<dyn Allocator> = Arc::new(CountingAllocator::new());
        entities(text, &alloc).unwrap()
    }

    #[test]
    fn test_entities() {
        let ents = parse(b"{\"classname\" \"info_player_start\"}{\"classname\" \"light\" \"light\" \"300\"}");

        assert_eq!(ents.len(), 2);
        assert_eq!(ents[0].len(), 1);
        assert_eq!(ents[1].len(), 2);
        assert_eq!(ents[0].get("classname"), Some(&b"info_player_start"[..]));
        assert_eq!(ents[1].get("light"), Some(&b"300"[..]));
        assert_eq!(ents[1].property(0).unwrap().value(), b"light");
    }

    #[test]
    fn test_map_layout() {
        let text = b"{\n\"classname\" \"worldspawn\"\n\"wad\" \"gfx/base.wad\"\n}\n{\n\"classname\" \"light\"\n\"origin\" \"0 0 64\"\n}\n\0";
        let ents = parse(text);

        assert_eq!(ents.len(), 2);
        assert_eq!(ents[0].get("wad"), Some(&b"gfx/base.wad"[..]));
        assert_eq!(ents[1].get("origin"), Some(&b"0 0 64"[..]));
    }

    #[test]
    fn test_unterminated_value() {
        let ents = parse(b"{\"k\" \"v");

        assert_eq!(ents.len(), 1);
        assert!(ents[0].is_empty());
    }

    #[test]
    fn test_unterminated_value_keeps_earlier_pairs() {
        let ents = parse(b"{\"a\" \"1\" \"b\" \"2");

        assert_eq!(ents.len(), 1);
        assert_eq!(ents[0].len(), 1);
        assert_eq!(ents[0].get("a"), Some(&b"1"[..]));
        assert_eq!(ents[0].get("b"), None);
    }

    #[test]
    fn test_unterminated_stops_scan() {
        let ents = parse(b"{\"a\" \"1\"}{\"k\" \"v {\"x\" \"y\"}");

        // the value of "k" is `v {`, then `x` is not a quote and the block ends
        assert_eq!(ents.len(), 2);
        assert_eq!(ents[1].get("k"), Some(&b"v {"[..]));

        // the value of "k" is never closed, so the later brace does not start a block
        let ents = parse(b"{\"a\" \"1\"}{\"k\" \"v} {");
        assert_eq!(ents.len(), 2);
        assert!(ents[1].is_empty());
    }

    #[test]
    fn test_bad_token_ends_block() {
        let ents = parse(b"{\"a\" \"1\" junk \"b\" \"2\"}{\"c\" \"3\"}");

        assert_eq!(ents.len(), 2);
        assert_eq!(ents[0].len(), 1);
        assert_eq!(ents[1].get("c"), Some(&b"3"[..]));
    }

    #[test]
    fn test_empty_block() {
        let ents = parse(b"{ }{}");

        assert_eq!(ents.len(), 2);
        assert!(ents.iter().all(|e| e.is_empty()));
    }

    #[test]
    fn test_stray_bytes_skipped() {
        let ents = parse(b"garbage } \"x\" {\"a\" \"1\"} trailing");

        assert_eq!(ents.len(), 1);
        assert_eq!(ents[0].get("a"), Some(&b"1"[..]));
    }

    #[test]
    fn test_stops_at_nul() {
        let ents = parse(b"{\"a\" \"1\"}\0{\"b\" \"2\"}");
        assert_eq!(ents.len(), 1);
    }

    #[test]
    fn test_first_match_wins() {
        let ents = parse(b"{\"k\" \"first\" \"k\" \"second\" \"K\" \"upper\"}");
        assert_eq!(ents[0].get("k"), Some(&b"first"[..]));
        assert_eq!(ents[0].get("K"), Some(&b"upper"[..]));
        assert_eq!(ents[0].get("missing"), None);
    }

    #[test]
    fn test_growth() {
        let mut text = Vec::new();
        for i in 0..20 {
            text.extend_from_slice(b"{");
            for j in 0..10 {
                text.extend_from_slice(format!("\"k{}\" \"{}\"", j, i).as_bytes());
            }
            text.extend_from_slice(b"}");
        }

        let ents = parse(&text);
        assert_eq!(ents.len(), 20);
        assert_eq!(ents.capacity(), 32);
        assert!(ents.iter().all(|e| e.len() == 10));
        assert_eq!(ents[19].get("k9"), Some(&b"19"[..]));
    }

    #[test]
    fn test_allocation_failure() {
        let text = b"{\"classname\" \"light\" \"light\" \"300\"}";

        for limit in 0..6 {
            let counter = Arc::new(CountingAllocator::with_limit(limit));
            let alloc: Arc<dyn Allocator> = counter.clone();

            let err = entities(text, &alloc).err().unwrap();
            assert_eq!(err.kind(), BspErrorKind::Allocation);
            assert_eq!(counter.live(), 0);
        }

        // entity block, property block, then two strings per pair
        let counter = Arc::new(CountingAllocator::with_limit(6));
        let alloc: Arc<dyn Allocator> = counter.clone();
        let ents = entities(text, &alloc).unwrap();
        assert_eq!(ents[0].len(), 2);
        drop(ents);
        assert_eq!(counter.live(), 0);
    }
}
