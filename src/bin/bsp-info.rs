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

extern crate docopt;
extern crate env_logger;
extern crate failure;
extern crate log;
extern crate quakebsp;
#[macro_use]
extern crate serde_derive;

use std::fs::File;
use std::io::BufReader;
use std::process::exit;

use quakebsp::Bsp;

use docopt::Docopt;
use failure::Fail;
use log::LevelFilter;

#[derive(Deserialize)]
struct Args {
    arg_file: String,
    flag_entities: bool,
    flag_textures: bool,
    flag_h: bool,
    flag_help: bool,
    flag_v: bool,
    flag_verbose: bool,
    flag_version: bool,
}

const USAGE: &'static str = "
Usage: bsp-info [options] <file>

Options:
    -e, --entities  Print every entity and its properties.
    -t, --textures  Print the texture directory.
    -v, --verbose   Produce detailed output.

    -h, --help      Show this message and exit.
        --version   Print version information and exit.
";

const VERSION: &'static str = "
bsp-info 0.1
Copyright © 2018 Cormac O'Brien
Released under the terms of the MIT License
";

fn print_summary(bsp: &Bsp) {
    println!("Entities:  {}", bsp.num_entities());
    println!("Planes:    {}", bsp.num_planes());
    println!("Miptex:    {}", bsp.miptex_count());
    println!("Vertices:  {}", bsp.num_vertices());
    println!("Visdata:   {} bytes", bsp.visdata_size());
    println!("Nodes:     {}", bsp.num_nodes());
    println!("Texinfo:   {}", bsp.num_texinfo());
    println!("Faces:     {}", bsp.num_faces());
    println!("Lighting:  {} bytes", bsp.lighting_size());
    println!("Clipnodes: {}", bsp.num_clipnodes());
    println!("Leaves:    {}", bsp.num_leaves());
    println!("Facelist:  {}", bsp.num_facelist());
    println!("Edges:     {}", bsp.num_edges());
    println!("Surfedges: {}", bsp.num_surfedges());
    println!("Models:    {}", bsp.num_models());
}

fn print_entities(bsp: &Bsp) {
    for (i, entity) in bsp.entities().iter().enumerate() {
        println!("entity {} {{", i);
        for prop in entity.properties() {
            println!(
                "    \"{}\" \"{}\"",
                String::from_utf8_lossy(prop.key()),
                String::from_utf8_lossy(prop.value())
            );
        }
        println!("}}");
    }
}

fn print_textures(bsp: &Bsp) {
    let miptex = match bsp.miptex_lump() {
        Some(m) => m,
        None => return,
    };

    for (i, tex) in miptex.iter().enumerate() {
        match tex {
            Some(t) => println!(
                "{:>4} {:<16} {}x{}",
                i,
                String::from_utf8_lossy(t.name()),
                t.width(),
                t.height()
            ),
            None => println!("{:>4} (empty)", i),
        }
    }
}

fn main() {
    let args: Args = Docopt::new(USAGE)
        .and_then(|d| d.deserialize())
        .unwrap_or_else(|e| e.exit());

    if args.flag_help || args.flag_h {
        println!("{}", USAGE);
        exit(0);
    }

    if args.flag_version {
        println!("{}", VERSION);
        exit(0);
    }

    let mut builder = env_logger::Builder::from_default_env();
    if args.flag_verbose || args.flag_v {
        builder.filter_level(LevelFilter::Debug);
    }
    builder.init();

    let mut reader = match File::open(&args.arg_file) {
        Ok(f) => BufReader::new(f),
        Err(why) => {
            println!("Couldn't open {}: {}", &args.arg_file, why);
            exit(1);
        }
    };

    let bsp = match quakebsp::load(&mut reader) {
        Ok(b) => b,
        Err(why) => {
            println!("Couldn't load {}: {}", &args.arg_file, why);
            let mut cause = why.cause();
            while let Some(c) = cause {
                println!("    caused by: {}", c);
                cause = c.cause();
            }
            exit(1);
        }
    };

    print_summary(&bsp);

    if args.flag_entities {
        println!();
        print_entities(&bsp);
    }

    if args.flag_textures {
        println!();
        print_textures(&bsp);
    }
}
