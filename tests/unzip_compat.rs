use std::fs::File;
use std::process::Command;
use tempfile::tempdir;

// Writes an archive with this crate and hands it to the system `unzip -t`
// to verify on-disk compatibility. Skipped if `unzip` is not installed.

#[test]
fn unzip_compatibility() {
    use zipcore::{open_writer, AddOptions, WriterOptions};

    let check = Command::new("unzip").arg("-v").output();
    if check.is_err() {
        eprintln!("skipping test: `unzip` not found");
        return;
    }

    let dir = tempdir().unwrap();
    let zip_path = dir.path().join("compat.zip");

    {
        let file = File::create(&zip_path).unwrap();
        let mut writer = open_writer(file, WriterOptions::default()).unwrap();
        writer
            .add_bytes(b"hello.txt", b"hello from test", AddOptions::default())
            .unwrap();
        let big = vec![0u8; 1024 * 1024];
        writer
            .add_bytes(b"big.bin", &big, AddOptions::default())
            .unwrap();
        writer.close().unwrap();
    }

    let output = Command::new("unzip")
        .arg("-t")
        .arg(&zip_path)
        .output()
        .expect("failed to run unzip");
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(
        output.status.success(),
        "unzip reported failure: {} {}",
        stdout,
        stderr
    );
}
