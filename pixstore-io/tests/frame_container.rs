#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_lossless,
    clippy::unreadable_literal,
    clippy::float_cmp
)]
use pixstore_core::{ElementType, ErrorKind, Frame, FrameData, MetaData, ACQ_TIME};
use pixstore_io::{Encoding, FrameContainer, Layout, SaveOptions};
use std::fmt::Write as _;
use tempfile::tempdir;

struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = (self.0.wrapping_mul(1103515245).wrapping_add(12345)) & 0x7fffffff;
        self.0
    }
}

fn sample_data(element_type: ElementType, len: usize, seed: u64) -> FrameData {
    let mut rng = Lcg(seed);
    let mut sparse = || {
        let v = rng.next();
        if v % 4 == 0 {
            v % 1000 + 1
        } else {
            0
        }
    };
    match element_type {
        ElementType::I16 => FrameData::I16((0..len).map(|_| sparse() as i16 - 300).collect()),
        ElementType::U32 => FrameData::U32((0..len).map(|_| sparse() as u32).collect()),
        ElementType::U64 => FrameData::U64((0..len).map(|_| sparse() << 33).collect()),
        ElementType::Double => {
            FrameData::Double((0..len).map(|_| sparse() as f64 / 7.0).collect())
        }
    }
}

fn sample_frame(element_type: ElementType, width: u32, height: u32, seed: u64) -> Frame {
    let mut frame = Frame::new(
        width,
        height,
        sample_data(element_type, (width * height) as usize, seed),
    )
    .unwrap();
    frame.set_acq_time(seed as f64 * 0.001 + 1.0 / 3.0);
    frame.set_start_time(1_700_000_000.0 + seed as f64);
    frame
        .metadata
        .insert(MetaData::from_text("Chipboard ID", "Chip ID", "H08-W0123"));
    frame
}

#[test]
fn test_indexed_append_round_trip_all_types() {
    let dir = tempdir().unwrap();
    for element_type in ElementType::ALL {
        for encoding in [Encoding::Binary, Encoding::Ascii] {
            let stream = dir.path().join(format!("{element_type}-{}.dat", encoding.letter()));
            let container = FrameContainer::new(&stream);
            let layouts = [Layout::Matrix, Layout::SparseX, Layout::SparseXY, Layout::Matrix];

            let frames: Vec<Frame> = (0..layouts.len() as u64)
                .map(|n| sample_frame(element_type, 9, 7, n + 1))
                .collect();
            for (frame, layout) in frames.iter().zip(layouts) {
                let options = SaveOptions::new()
                    .with_layout(layout)
                    .with_encoding(encoding)
                    .with_append(true);
                container.save(frame, &options).unwrap();
            }

            assert_eq!(container.frame_count().unwrap(), frames.len() as u64);
            assert!(container.validate().unwrap().is_consistent());
            for (n, frame) in frames.iter().enumerate() {
                let loaded = container.load(n as u64).unwrap();
                assert_eq!(&loaded, frame, "{element_type} {encoding:?} frame {n}");
            }
        }
    }
}

#[test]
fn test_five_double_frames_example() {
    let dir = tempdir().unwrap();
    let container = FrameContainer::new(dir.path().join("run").join("stack.raw"));
    let options = SaveOptions::new().with_append(true);

    let frames: Vec<Frame> = (0..5)
        .map(|n| sample_frame(ElementType::Double, 256, 256, n + 11))
        .collect();
    for frame in &frames {
        container.save(frame, &options).unwrap();
    }

    let loaded = container.load(3).unwrap();
    assert_eq!(loaded.data(), frames[3].data());
    let expected = frames[3].acq_time().unwrap();
    let acq = loaded.metadata.get(ACQ_TIME).unwrap().as_f64().unwrap();
    assert_eq!(acq.to_bits(), expected.to_bits());

    // The index holds one record per frame after the first.
    let idx = std::fs::metadata(&container.paths().index).unwrap().len();
    assert_eq!(idx, 4 * 24);
}

#[test]
fn test_compact_precision_rounds_metadata() {
    let dir = tempdir().unwrap();
    let container = FrameContainer::new(dir.path().join("compact.raw"));
    let mut frame = Frame::zeroed(2, 2, ElementType::U32).unwrap();
    frame.set_acq_time(0.123456789);
    container
        .save(&frame, &SaveOptions::new().with_max_precision(false))
        .unwrap();
    assert_eq!(container.load(0).unwrap().acq_time(), Some(0.12346));
}

#[test]
fn test_sparse_and_dense_decode_identically() {
    let dir = tempdir().unwrap();
    let source = sample_frame(ElementType::U32, 64, 32, 99);
    let mut decoded = Vec::new();
    for encoding in [Encoding::Binary, Encoding::Ascii] {
        for layout in [Layout::Matrix, Layout::SparseX, Layout::SparseXY] {
            let container =
                FrameContainer::new(dir.path().join(format!("{layout:?}-{encoding:?}.dat")));
            let options = SaveOptions::new().with_layout(layout).with_encoding(encoding);
            container.save(&source, &options).unwrap();
            decoded.push(container.load(0).unwrap());
        }
    }
    for frame in &decoded {
        assert_eq!(frame.data(), source.data());
    }
    // Zeros are present in the source and implicit in the sparse payloads.
    assert!(source.data().non_zero_count() < source.len());
}

#[test]
fn test_binary_search_without_index() {
    let dir = tempdir().unwrap();
    let mut rng = Lcg(7);
    for count in [1u64, 2, 1000] {
        let container = FrameContainer::new(dir.path().join(format!("noidx-{count}.raw")));
        let options = SaveOptions::new().with_append(true);
        for n in 0..count {
            let mut frame = Frame::new(2, 2, FrameData::U32(vec![n as u32, 1, 2, 3])).unwrap();
            frame.set_acq_time(n as f64);
            container.save(&frame, &options).unwrap();
        }
        if count > 1 {
            std::fs::remove_file(&container.paths().index).unwrap();
        }

        let mut targets = vec![0, count / 2, count - 1];
        targets.extend((0..20).map(|_| rng.next() % count));
        for target in targets {
            let frame = container.load(target).unwrap();
            assert_eq!(frame.data().get_f64(0), Some(target as f64));
            assert_eq!(frame.acq_time(), Some(target as f64));
        }
        assert_eq!(
            container.load(count).unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
    }
}

#[test]
fn test_empty_stream_has_no_frames() {
    let dir = tempdir().unwrap();
    let container = FrameContainer::new(dir.path().join("empty.raw"));
    std::fs::write(&container.paths().data, b"").unwrap();
    std::fs::write(&container.paths().description, b"B000000000").unwrap();
    assert_eq!(container.frame_count().unwrap(), 0);
    assert_eq!(container.load(0).unwrap_err().kind(), ErrorKind::InvalidArgument);
}

#[test]
fn test_sparse_without_index_needs_index() {
    let dir = tempdir().unwrap();
    let container = FrameContainer::new(dir.path().join("sparse.raw"));
    let options = SaveOptions::new()
        .with_layout(Layout::SparseX)
        .with_append(true);
    for n in 0..3 {
        container
            .save(&sample_frame(ElementType::U32, 8, 8, n), &options)
            .unwrap();
    }
    std::fs::remove_file(&container.paths().index).unwrap();

    assert_eq!(container.load(1).unwrap_err().kind(), ErrorKind::InvalidArgument);
    let report = container.validate().unwrap();
    assert!(!report.is_consistent());
}

#[test]
fn test_header_count_mismatch_is_bad_data() {
    let dir = tempdir().unwrap();
    let container = FrameContainer::new(dir.path().join("bad.raw"));
    let options = SaveOptions::new().with_append(true);
    for n in 0..3 {
        container
            .save(&sample_frame(ElementType::I16, 4, 4, n), &options)
            .unwrap();
    }

    // Claim five frames while three blocks exist.
    let dsc = &container.paths().description;
    let mut text = std::fs::read(dsc).unwrap();
    text[..10].copy_from_slice(b"B000000005");
    std::fs::write(dsc, &text).unwrap();
    assert_eq!(container.load(1).unwrap_err().kind(), ErrorKind::BadData);

    std::fs::remove_file(&container.paths().index).unwrap();
    assert_eq!(container.load(1).unwrap_err().kind(), ErrorKind::BadData);

    // Claim two frames while three blocks exist.
    text[..10].copy_from_slice(b"B000000002");
    std::fs::write(dsc, &text).unwrap();
    assert_eq!(container.load(1).unwrap_err().kind(), ErrorKind::BadData);

    let report = container.validate().unwrap();
    assert_eq!(report.header_count, Some(2));
    assert_eq!(report.description_blocks, Some(3));
    assert!(!report.is_consistent());
}

#[test]
fn test_truncated_data_is_bad_data() {
    let dir = tempdir().unwrap();
    let container = FrameContainer::new(dir.path().join("cut.raw"));
    let options = SaveOptions::new().with_append(true);
    for n in 0..2 {
        container
            .save(&sample_frame(ElementType::U64, 4, 4, n), &options)
            .unwrap();
    }
    let data = std::fs::read(&container.paths().data).unwrap();
    std::fs::write(&container.paths().data, &data[..data.len() - 8]).unwrap();

    assert_eq!(container.load(1).unwrap_err().kind(), ErrorKind::BadData);
    assert!(container.load(0).is_ok());
}

#[test]
fn test_mixed_encodings_rejected() {
    let dir = tempdir().unwrap();
    let container = FrameContainer::new(dir.path().join("mixed.raw"));
    let frame = sample_frame(ElementType::U32, 4, 4, 1);
    container
        .save(&frame, &SaveOptions::new().with_append(true))
        .unwrap();
    let err = container
        .save(
            &frame,
            &SaveOptions::new()
                .with_append(true)
                .with_encoding(Encoding::Ascii),
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[test]
fn test_sparse_ascii_append_separator() {
    let dir = tempdir().unwrap();
    let container = FrameContainer::new(dir.path().join("hits.txt"));
    let options = SaveOptions::new()
        .with_layout(Layout::SparseX)
        .with_encoding(Encoding::Ascii)
        .with_append(true);
    let frame = Frame::new(2, 2, FrameData::U32(vec![0, 5, 0, 0])).unwrap();
    container.save(&frame, &options).unwrap();
    container.save(&frame, &options).unwrap();

    let text = std::fs::read_to_string(&container.paths().data).unwrap();
    assert_eq!(text, "1\t5\n#\n1\t5\n");
    assert_eq!(container.load(1).unwrap().data(), frame.data());
}

#[test]
fn test_text_metadata_rejects_newlines() {
    let dir = tempdir().unwrap();
    let container = FrameContainer::new(dir.path().join("meta.raw"));
    let mut frame = Frame::zeroed(2, 2, ElementType::U32).unwrap();
    frame
        .metadata
        .insert(MetaData::from_text("Note", "", "two\nlines"));
    let err = container.save(&frame, &SaveOptions::new()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[test]
fn test_guessed_ascii_matrix_written_without_description() {
    let dir = tempdir().unwrap();
    let container = FrameContainer::new(dir.path().join("plain.txt"));
    let mut text = String::new();
    for y in 0..4 {
        for x in 0..6 {
            let _ = write!(text, "{} ", y * 6 + x);
        }
        text.push('\n');
    }
    std::fs::write(&container.paths().data, text).unwrap();

    assert_eq!(container.frame_count().unwrap(), 1);
    let frame = container.load(0).unwrap();
    assert_eq!((frame.width(), frame.height()), (6, 4));
    assert_eq!(frame.data().get_f64(23), Some(23.0));
    assert_eq!(container.load(1).unwrap_err().kind(), ErrorKind::InvalidArgument);
}

#[test]
fn test_text_metadata_that_cannot_round_trip_is_rejected() {
    let dir = tempdir().unwrap();
    for (n, value) in ["[F9]", "", "   "].into_iter().enumerate() {
        let container = FrameContainer::new(dir.path().join(format!("note{n}.raw")));
        let mut frame = Frame::zeroed(2, 2, ElementType::U32).unwrap();
        frame.metadata.insert(MetaData::from_text("Note", "", value));
        let err = container.save(&frame, &SaveOptions::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument, "{value:?}");
        assert!(!container.paths().data.exists());
        assert!(!container.paths().description.exists());
    }

    // The same note inside a longer line is ordinary text.
    let container = FrameContainer::new(dir.path().join("note.raw"));
    let mut frame = Frame::zeroed(2, 2, ElementType::U32).unwrap();
    frame.metadata.insert(MetaData::from_text("Note", "", "see [F9]"));
    container.save(&frame, &SaveOptions::new()).unwrap();
    assert_eq!(container.load(0).unwrap(), frame);
}
