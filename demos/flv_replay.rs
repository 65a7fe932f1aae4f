//! FLV Replay - Feeds an existing FLV file through a recording session
//!
//! Run with: cargo run --example flv_replay -- <input.flv> [stream_name] [output_dir]
//!
//! Each tag of the input is delivered the way an RTMP transport would deliver
//! the matching message: script data as metadata, audio and video as media.
//! The result lands in `<output_dir>/<stream_name>.flv` (default
//! `received/replay.flv`) and should be byte-identical to the input tags,
//! since the default transform is a pass-through.
//!
//! ```text
//!   input.flv ──> FlvReader ──> Session callbacks ──> received/replay.flv
//! ```

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use flv_ingest::media::{FlvReader, FlvTagType};
use flv_ingest::session::ConnectInfo;
use flv_ingest::{IngestHandler, Recorder, RecorderConfig};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("flv_ingest=debug".parse()?)
                .add_directive("flv_replay=info".parse()?),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let input = match args.next() {
        Some(path) => PathBuf::from(path),
        None => {
            eprintln!("usage: flv_replay <input.flv> [stream_name] [output_dir]");
            std::process::exit(2);
        }
    };
    let stream_name = args.next().unwrap_or_else(|| "replay".to_string());
    let output_dir = args
        .next()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("received"));

    let reader = FlvReader::new(BufReader::new(File::open(&input)?))?;
    tracing::info!(input = %input.display(), flags = ?reader.flags(), "Replaying");

    let recorder = Recorder::new(
        RecorderConfig::with_base_dir(&output_dir)
            .flags(reader.flags())
            .validate_timestamps(true),
    );

    let mut session = recorder.session()?;
    session.on_connect(&ConnectInfo::new("live"))?;
    session.on_create_stream()?;
    session.on_publish(&stream_name)?;

    let mut replayed = 0u64;
    for tag in reader {
        let tag = tag?;
        match tag.tag_type {
            FlvTagType::Script => session.on_metadata(tag.timestamp, tag.body)?,
            FlvTagType::Audio => session.on_audio(tag.timestamp, tag.body)?,
            FlvTagType::Video => session.on_video(tag.timestamp, tag.body)?,
        }
        replayed += 1;
    }
    session.on_close()?;

    let stats = session.stats();
    println!(
        "Replayed {} tags: audio={} video={} keyframes={} transformed={} dropped_scripts={}",
        replayed,
        stats.audio_tags,
        stats.video_tags,
        stats.keyframes,
        stats.transformed,
        stats.dropped_scripts,
    );
    Ok(())
}
