//! Formats a fresh in-memory volume, writes a file, and lists the root
//! directory back. Not wired into Cargo's example harness (this directory
//! sits alongside, not inside, `examples/`); run its contents by pasting
//! into a scratch `fn main` or a test.

use fatvol::boot_sector::Dialect;
use fatvol::clock::SystemClock;
use fatvol::device::MemoryBlockDevice;
use fatvol::format::{FormatOptions, SuperFloppyFormatter};
use fatvol::fs::MountOptions;

fn main() {
    let device = Box::new(MemoryBlockDevice::new(16 * 1024 * 1024, 512));
    let options = FormatOptions {
        volume_label: Some("DEMO".to_string()),
        dialect: Dialect::Pc,
        ..FormatOptions::default()
    };

    let mut rng = rand::thread_rng();
    let mut fs = SuperFloppyFormatter::format(device, options, &mut rng, Box::new(SystemClock)).unwrap();

    let root = fs.root();
    let hello = fs.add_file(root, "HELLO.TXT").unwrap();
    fs.write_file(hello, 0, b"hello from a freshly formatted volume\n").unwrap();
    fs.flush_file(hello).unwrap();
    fs.flush().unwrap();

    for entry in fs.iterate(root) {
        println!("{:>10} {}", entry.short.file_size, entry.name());
    }

    println!("label: {:?}", fs.volume_label());
    println!("free space: {} bytes", fs.free_space());

    let _ = MountOptions::default();
}
