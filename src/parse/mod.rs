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

pub mod entity;

use crate::util;

use nom::{bytes::complete::take_while, character::complete::char, sequence::delimited};

pub use self::entity::entities;

pub fn space(input: &[u8]) -> nom::IResult<&[u8], &[u8]> {
    take_while(util::is_space)(input)
}

fn string_contents(input: &[u8]) -> nom::IResult<&[u8], &[u8]> {
    take_while(|b| b != b'"')(input)
}

/// A run of bytes between two double quotes. There are no escapes.
pub fn quoted(input: &[u8]) -> nom::IResult<&[u8], &[u8]> {
    delimited(char('"'), string_contents, char('"'))(input)
}
