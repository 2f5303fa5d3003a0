use std::io::Cursor;

use crate::codec::{self, Compressor};
use crate::codec::zstdc::ZstdCompressor;
use crate::read::{ReadOutcome, TransformReader};
use crate::testutil::pseudo_random;

fn drain<R: std::io::Read>(reader: &mut TransformReader<R>, n: usize) -> Vec<Vec<u8>> {
    let mut chunks = Vec::new();
    while let ReadOutcome::Data(chunk) = reader.read_chunk(n).unwrap() {
        chunks.push(chunk);
    }
    chunks
}

fn decompress(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    ZstdCompressor
        .decompress(&mut Cursor::new(bytes), &mut out)
        .unwrap();
    out
}

#[test]
fn plain_reader_yields_fixed_size_chunks() {
    let data = pseudo_random(10_000, 1);
    let mut reader = TransformReader::plain(Cursor::new(data.clone()));
    let chunks = drain(&mut reader, 4096);
    let sizes: Vec<usize> = chunks.iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![4096, 4096, 1808]);
    assert_eq!(chunks.concat(), data);
}

#[test]
fn plain_reader_signals_end_once_then_exhausted() {
    let mut reader = TransformReader::plain(Cursor::new(b"abc".to_vec()));
    assert_eq!(reader.read_chunk(8).unwrap(), ReadOutcome::Data(b"abc".to_vec()));
    assert_eq!(reader.read_chunk(8).unwrap(), ReadOutcome::End);
    for _ in 0..3 {
        assert_eq!(reader.read_chunk(8).unwrap(), ReadOutcome::Exhausted);
    }
}

#[test]
fn plain_empty_source_ends_immediately() {
    let mut reader = TransformReader::plain(Cursor::new(Vec::<u8>::new()));
    assert_eq!(reader.read_chunk(1024).unwrap(), ReadOutcome::End);
    assert_eq!(reader.read_chunk(1024).unwrap(), ReadOutcome::Exhausted);
    assert_eq!(reader.read_chunk(1024).unwrap(), ReadOutcome::Exhausted);
}

#[test]
fn compressed_empty_source_still_emits_a_frame() {
    let codec = codec::select("zstd").unwrap();
    let mut reader =
        TransformReader::compressed(Cursor::new(Vec::<u8>::new()), codec.encoder(3).unwrap());
    let first = reader.read_chunk(1024).unwrap().into_data().expect("frame header");
    assert!(!first.is_empty());
    assert!(decompress(&first).is_empty());
    assert_eq!(reader.read_chunk(1024).unwrap(), ReadOutcome::Exhausted);
    assert_eq!(reader.read_chunk(1024).unwrap(), ReadOutcome::Exhausted);
}

#[test]
fn compressed_chunks_are_full_except_the_last() {
    let data = pseudo_random(300_000, 7);
    let mut reader =
        TransformReader::compressed(Cursor::new(data.clone()), ZstdCompressor.encoder(3).unwrap());
    let chunks = drain(&mut reader, 50_000);
    assert!(chunks.len() > 1);
    let (last, full) = chunks.split_last().unwrap();
    assert!(full.iter().all(|c| c.len() == 50_000));
    assert!(!last.is_empty() && last.len() <= 50_000);
    assert_eq!(reader.read_chunk(50_000).unwrap(), ReadOutcome::Exhausted);
    assert_eq!(decompress(&chunks.concat()), data);
}

#[test]
fn compression_round_trips_repetitive_content() {
    let data: Vec<u8> = b"glacier ".iter().copied().cycle().take(1 << 20).collect();
    let mut reader =
        TransformReader::compressed(Cursor::new(data.clone()), ZstdCompressor.encoder(3).unwrap());
    let stream = drain(&mut reader, 1 << 20).concat();
    assert!(stream.len() < data.len() / 10);
    assert_eq!(decompress(&stream), data);
}

#[test]
fn unknown_codec_is_a_configuration_error() {
    let err = codec::select("lz4").err().expect("lz4 is not available");
    assert!(err.is_fatal(), "{err}");
}
