// Copyright (C) 2024 rk8s authors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::io::Write;
use std::path::Path;

use splinterfs::{SourceFile, SplitFs, SplitLayout};

fn write_source(path: &Path, len: usize, seed: u8) -> Vec<u8> {
    let data: Vec<u8> = (0..len)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
        .collect();
    std::fs::write(path, &data).unwrap();
    data
}

// Concatenate every listed split, reading each in kernel-sized chunks.
async fn reassemble(fs: &SplitFs, chunk: u32) -> Vec<u8> {
    let mut out = Vec::new();
    for entry in fs.readdir("/").await.unwrap().into_iter().skip(2) {
        let path = format!("/{}", entry.name);
        fs.open(&path, libc::O_RDONLY as u32).await.unwrap();
        let size = fs.getattr(&path).await.unwrap().size;
        let mut off = 0;
        while off < size {
            let want = chunk.min((size - off) as u32);
            let data = fs.read(&path, off, want).await.unwrap();
            assert_eq!(data.len() as u32, want, "{path} at {off}");
            out.extend_from_slice(&data);
            off += data.len() as u64;
        }
    }
    out
}

#[tokio::test]
async fn test_reassembled_splits_match_source() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("archive.tar");
    let data = write_source(&path, 10_007, 3);

    let fs = SplitFs::new(
        SourceFile::open(&path).unwrap(),
        SplitLayout::new(1000, 1000).unwrap(),
    );
    assert_eq!(fs.readdir("/").await.unwrap().len(), 2 + 11);
    assert_eq!(reassemble(&fs, 128).await, data);
}

#[tokio::test]
async fn test_source_growth_is_visible() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("growing.img");
    let mut data = write_source(&path, 2500, 9);

    let fs = SplitFs::new(
        SourceFile::open(&path).unwrap(),
        SplitLayout::new(1000, 1000).unwrap(),
    );
    assert_eq!(reassemble(&fs, 4096).await, data);

    let copy = data.clone();
    let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
    f.write_all(&copy).unwrap();
    data.extend_from_slice(&copy);

    let names: Vec<String> = fs
        .readdir("/")
        .await
        .unwrap()
        .into_iter()
        .skip(2)
        .map(|e| e.name)
        .collect();
    assert_eq!(
        names,
        [
            "0_growing.img",
            "1_growing.img",
            "2_growing.img",
            "3_growing.img",
            "4_growing.img"
        ]
    );
    assert_eq!(reassemble(&fs, 4096).await, data);
}

#[tokio::test]
async fn test_tail_past_max_splits_is_hidden() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("huge.bin");
    let data = write_source(&path, 5000, 0);

    let fs = SplitFs::new(
        SourceFile::open(&path).unwrap(),
        SplitLayout::new(1000, 3).unwrap(),
    );
    assert_eq!(reassemble(&fs, 512).await, &data[..3000]);
    assert_eq!(
        fs.read("/3_huge.bin", 0, 10).await.unwrap_err().errno(),
        libc::ENOENT
    );
}
