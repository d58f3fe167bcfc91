//! Basic usage example for zipcore

use std::fs::File;

use zipcore::{open_reader, open_writer, AddOptions, WriterOptions};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== zipcore basic example ===\n");

    println!("Creating test.zip...");
    let file = File::create("test.zip")?;
    let mut writer = open_writer(file, WriterOptions::default())?;

    writer.add_bytes(b"hello.txt", b"Hello, zipcore!", AddOptions::default())?;
    writer.add_bytes(
        b"folder/nested.txt",
        b"This is a nested file.",
        AddOptions::default(),
    )?;
    writer.add_bytes(
        b"data.txt",
        b"Line 1\nLine 2\nLine 3\n",
        AddOptions::default(),
    )?;
    writer.close()?;
    println!("created test.zip\n");

    println!("Reading test.zip...");
    let file = File::open("test.zip")?;
    let mut archive = open_reader(file)?;

    println!("Entries in ZIP:");
    for entry in archive.entries() {
        println!("  - {} ({} bytes)", entry.path_str(), entry.uncompressed_size);
    }
    println!();

    let entries: Vec<_> = archive.entries().to_vec();
    for entry in &entries {
        if entry.path == b"hello.txt" {
            let mut buf = Vec::new();
            archive.extract(entry, &mut buf)?;
            println!("hello.txt: {}", String::from_utf8_lossy(&buf));
        }
        if entry.path == b"data.txt" {
            let mut buf = Vec::new();
            archive.extract(entry, &mut buf)?;
            println!("data.txt:\n{}", String::from_utf8_lossy(&buf));
        }
    }

    println!("done");
    Ok(())
}
