//! End-to-end recording tests through the public API

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use flv_ingest::amf::{amf0, AmfObject, AmfValue};
use flv_ingest::error::TransformError;
use flv_ingest::media::{FlvFlags, FlvReader, FlvTagType, VideoCodec};
use flv_ingest::session::{ConnectInfo, SessionPhase};
use flv_ingest::{FrameTransform, IngestHandler, Recorder, RecorderConfig};

const AAC_HEADER: &[u8] = &[0xAF, 0x00, 0x12, 0x10];
const AAC_RAW: &[u8] = &[0xAF, 0x01, 0x21, 0x10, 0x04, 0x60];
const AVC_HEADER: &[u8] = &[
    0x17, 0x00, 0x00, 0x00, 0x00, // key, AVC, sequence header, cts 0
    0x01, 0x64, 0x00, 0x1F, 0xFF, // version, High, compat, level 3.1, 4-byte NALU lengths
    0xE1, 0x00, 0x04, 0x67, 0x64, 0x00, 0x1F, // 1 SPS
    0x01, 0x00, 0x02, 0x68, 0xEE, // 1 PPS
];
const AVC_KEY: &[u8] = &[
    0x17, 0x01, 0x00, 0x00, 0x42, 0x00, 0x00, 0x00, 0x03, 0x65, 0x88, 0x84,
];
const AVC_INTER: &[u8] = &[
    0x27, 0x01, 0x00, 0x00, 0x21, 0x00, 0x00, 0x00, 0x02, 0x41, 0x9A,
];

fn metadata() -> Bytes {
    let props: AmfObject = [
        ("duration", AmfValue::from(0.0)),
        ("width", AmfValue::from(1920.0)),
        ("height", AmfValue::from(1080.0)),
        ("videocodecid", AmfValue::from(7.0)),
        ("audiocodecid", AmfValue::from(10.0)),
        ("encoder", AmfValue::from("obs-output module")),
        ("stereo", AmfValue::from(true)),
    ]
    .into_iter()
    .collect();
    amf0::encode_all(&[
        AmfValue::from("@setDataFrame"),
        AmfValue::from("onMetaData"),
        AmfValue::ecma_array(props),
    ])
}

fn failing() -> Arc<dyn FrameTransform> {
    Arc::new(|_s: Bytes, _c: VideoCodec| Err(TransformError::Apply("not today".into())))
}

fn read(path: &Path) -> Vec<(FlvTagType, u32, Bytes)> {
    let reader = FlvReader::new(std::fs::File::open(path).unwrap()).unwrap();
    reader
        .map(|tag| {
            let tag = tag.unwrap();
            (tag.tag_type, tag.timestamp, tag.body)
        })
        .collect()
}

#[test]
fn records_publish_byte_for_byte() {
    let dir = tempfile::tempdir().unwrap();
    let recorder = Recorder::with_transform(RecorderConfig::with_base_dir(dir.path()), failing());

    let mut session = recorder.session().unwrap();
    session.on_connect(&ConnectInfo::new("live")).unwrap();
    session.on_create_stream().unwrap();
    session.on_publish("obs").unwrap();

    let input: Vec<(FlvTagType, u32, Bytes)> = vec![
        (FlvTagType::Script, 0, metadata()),
        (FlvTagType::Video, 0, Bytes::from_static(AVC_HEADER)),
        (FlvTagType::Audio, 0, Bytes::from_static(AAC_HEADER)),
        (FlvTagType::Video, 0, Bytes::from_static(AVC_KEY)),
        (FlvTagType::Audio, 21, Bytes::from_static(AAC_RAW)),
        (FlvTagType::Video, 33, Bytes::from_static(AVC_INTER)),
        (FlvTagType::Audio, 42, Bytes::from_static(AAC_RAW)),
        (FlvTagType::Video, 2000, Bytes::from_static(AVC_KEY)),
    ];
    for (tag_type, ts, body) in &input {
        let result = match tag_type {
            FlvTagType::Script => session.on_metadata(*ts, body.clone()),
            FlvTagType::Audio => session.on_audio(*ts, body.clone()),
            FlvTagType::Video => session.on_video(*ts, body.clone()),
        };
        result.unwrap();
    }
    session.on_close().unwrap();

    assert_eq!(read(&dir.path().join("obs.flv")), input);

    let stats = session.stats();
    assert_eq!(stats.keyframes, 3);
    assert_eq!(stats.transform_failures, 2);
    assert!(stats.has_video_header && stats.has_audio_header && stats.has_metadata);
}

#[test]
fn file_layout_matches_flv() {
    let dir = tempfile::tempdir().unwrap();
    let config = RecorderConfig::with_base_dir(dir.path()).flags(FlvFlags {
        audio: true,
        video: false,
    });
    let recorder = Recorder::new(config);

    let mut session = recorder.session().unwrap();
    session.on_publish("audio-only").unwrap();
    session
        .on_audio(0x7F00_0001, Bytes::from_static(AAC_RAW))
        .unwrap();
    session.on_close().unwrap();

    let bytes = std::fs::read(dir.path().join("audio-only.flv")).unwrap();
    assert_eq!(
        &bytes[..13],
        &[b'F', b'L', b'V', 0x01, 0x04, 0, 0, 0, 9, 0, 0, 0, 0]
    );

    let size = AAC_RAW.len() as u8;
    assert_eq!(
        &bytes[13..24],
        &[0x08, 0x00, 0x00, size, 0x00, 0x00, 0x01, 0x7F, 0x00, 0x00, 0x00]
    );
    assert_eq!(&bytes[24..24 + AAC_RAW.len()], AAC_RAW);
    assert_eq!(
        &bytes[24 + AAC_RAW.len()..],
        &(11 + AAC_RAW.len() as u32).to_be_bytes()
    );
}

#[test]
fn hostile_stream_names_stay_in_base_dir() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("received");
    let recorder = Recorder::new(RecorderConfig::with_base_dir(&base));

    let mut session = recorder.session().unwrap();
    session.on_publish("../../etc/passwd").unwrap();
    session.on_close().unwrap();

    assert!(base.join("etc_passwd.flv").is_file());
    let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
    assert_eq!(entries.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_sessions_write_separate_files() {
    let dir = tempfile::tempdir().unwrap();
    let recorder = Arc::new(Recorder::new(RecorderConfig::with_base_dir(dir.path())));

    let mut tasks = Vec::new();
    for i in 0..8u32 {
        let handle = recorder.spawn_session().unwrap();
        tasks.push(tokio::spawn(async move {
            handle.on_connect(ConnectInfo::new("live")).await.unwrap();
            handle.on_create_stream().await.unwrap();
            handle.on_publish(format!("cam{}", i)).await.unwrap();
            for n in 0..=i {
                handle
                    .on_video(n * 40, Bytes::from_static(AVC_INTER))
                    .await
                    .unwrap();
            }
            handle.on_close().await.unwrap();
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    for i in 0..8u32 {
        let tags = read(&dir.path().join(format!("cam{}.flv", i)));
        assert_eq!(tags.len(), i as usize + 1);
        let timestamps: Vec<u32> = tags.iter().map(|(_, ts, _)| *ts).collect();
        let expected: Vec<u32> = (0..=i).map(|n| n * 40).collect();
        assert_eq!(timestamps, expected);
    }
}

#[test]
fn failed_session_keeps_valid_prefix() {
    let dir = tempfile::tempdir().unwrap();
    let recorder = Recorder::new(RecorderConfig::with_base_dir(dir.path()));

    let mut session = recorder.session().unwrap();
    session.on_publish("s").unwrap();
    session.on_video(0, Bytes::from_static(AVC_HEADER)).unwrap();
    session.on_video(0, Bytes::from_static(AVC_KEY)).unwrap();
    // Frame type 0 is not defined
    assert!(session.on_video(40, Bytes::from_static(&[0x07, 0x01])).is_err());
    assert_eq!(session.phase(), SessionPhase::Failed);
    drop(session);

    let tags = read(&dir.path().join("s.flv"));
    assert_eq!(tags.len(), 2);
    assert_eq!(tags[1].2.as_ref(), AVC_KEY);
}
