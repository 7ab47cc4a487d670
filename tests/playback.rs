//! Demuxer and Clip integration tests.
//!
//! Media-dependent tests require `tests/fixtures/sample_video.mp4` (any
//! short file with one video and one audio stream) and skip silently when
//! it is absent. Error-path tests run everywhere.

use std::{io::Write, path::Path, sync::Arc};

use ffmpeg_next::media::Type;
use parking_lot::Mutex;
use playhead::{
    Clip, ClipOptions, DecoderOptions, Demuxer, NullSink, PlayheadError, SeekFlags, StreamDecoder,
    UploadSink, VideoMode, timing,
};

/// Capture crate diagnostics in test output; safe to call repeatedly.
fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn sample_video_path() -> &'static str {
    init_logging();
    "tests/fixtures/sample_video.mp4"
}

// ── Error paths (no fixtures needed) ─────────────────────────────

#[test]
fn open_missing_file_fails() {
    init_logging();
    let result = Demuxer::open("tests/fixtures/does_not_exist.mp4");
    assert!(matches!(result, Err(PlayheadError::Open { .. })));
}

#[test]
fn open_garbage_fails() {
    init_logging();
    let mut file = tempfile::NamedTempFile::new().expect("Failed to create temp file");
    file.write_all(&[0x00, 0x13, 0x37, 0xFF, 0xAB, 0xCD].repeat(512))
        .expect("Failed to write temp file");

    let result = Demuxer::open(file.path());
    assert!(matches!(result, Err(PlayheadError::Open { .. })));
}

#[test]
fn clip_open_missing_file_fails() {
    init_logging();
    let result = Clip::open(
        "tests/fixtures/does_not_exist.mp4",
        ClipOptions::new(),
        Arc::new(NullSink),
    );
    assert!(matches!(result, Err(PlayheadError::Open { .. })));
}

// ── Demuxer ──────────────────────────────────────────────────────

#[test]
fn demuxer_snapshots_streams() {
    let path = sample_video_path();
    if !Path::new(path).exists() {
        return;
    }

    let demuxer = Demuxer::open(path).expect("Failed to open fixture");
    assert!(!demuxer.streams().is_empty());
    assert!(demuxer.duration() > 0);

    let video = demuxer
        .find_best_stream(Type::Video)
        .expect("fixture has video");
    let info = &demuxer.streams()[video];
    assert_eq!(info.kind(), Type::Video);
    assert_ne!(info.resolution(), (0, 0));
    assert!(info.time_base().1 > 0);
}

#[test]
fn demuxer_routes_packets_to_the_matching_port() {
    let path = sample_video_path();
    if !Path::new(path).exists() {
        return;
    }

    let mut demuxer = Demuxer::open(path).expect("Failed to open fixture");
    demuxer.read();

    let index = demuxer
        .last_stream_index()
        .expect("first read produces a packet");
    let port = demuxer.port(index).expect("port exists for every stream");
    let packet = port.pull().expect("packet was routed");
    assert_eq!(packet.stream(), index);
    assert!(packet.size() > 0);
}

#[test]
fn eof_rotates_flush_markers_across_streams() {
    let path = sample_video_path();
    if !Path::new(path).exists() {
        return;
    }

    let mut demuxer = Demuxer::open(path).expect("Failed to open fixture");
    let stream_count = demuxer.streams().len();

    // Drain the whole container. Flush markers are empty packets.
    let mut marker_indexes = Vec::new();
    for _ in 0..1_000_000 {
        demuxer.read();
        let Some(index) = demuxer.last_stream_index() else {
            panic!("read error before EOF");
        };
        let port = demuxer.port(index).expect("port exists");
        let is_marker = port.latest(|packet| packet.is_some_and(|p| p.size() == 0));
        if is_marker {
            marker_indexes.push(index);
            if marker_indexes.len() == 2 * stream_count {
                break;
            }
        }
    }

    assert_eq!(marker_indexes.len(), 2 * stream_count);
    // One marker per stream per cycle, in rotation.
    for (step, index) in marker_indexes.iter().enumerate() {
        assert_eq!(*index, (marker_indexes[0] + step) % stream_count);
    }
}

#[test]
fn seek_rejects_nothing_within_the_clip() {
    let path = sample_video_path();
    if !Path::new(path).exists() {
        return;
    }

    let mut demuxer = Demuxer::open(path).expect("Failed to open fixture");
    let flags = SeekFlags {
        backward: true,
        any_frame: false,
    };
    demuxer.seek(0, flags).expect("seek to start");
    demuxer
        .seek(demuxer.duration() / 2, flags)
        .expect("seek to middle");
    demuxer.flush();
    demuxer.read();
    assert!(demuxer.last_stream_index().is_some());
}

// ── StreamDecoder ────────────────────────────────────────────────

#[test]
fn decoder_pulls_packets_through_the_feed_callback() {
    let path = sample_video_path();
    if !Path::new(path).exists() {
        return;
    }

    let mut demuxer = Demuxer::open(path).expect("Failed to open fixture");
    let index = demuxer
        .find_best_stream(Type::Video)
        .expect("fixture has video");
    let info = &demuxer.streams()[index];

    let mut decoder: StreamDecoder<ffmpeg_next::frame::Video> =
        StreamDecoder::open(info, &DecoderOptions::new()).expect("Failed to open decoder");
    let queue = decoder.queue();
    let port = demuxer.port(index).expect("port exists");

    let mut frames = 0;
    for _ in 0..5 {
        let frame = decoder.decode(|| {
            demuxer.read();
            let produced = demuxer.last_stream_index().is_some();
            if let Some(packet) = port.pull() {
                queue.push(packet);
            }
            produced
        });

        match frame {
            Some(frame) => {
                assert!(frame.width() > 0);
                frames += 1;
            }
            None => break,
        }
    }

    assert!(frames > 0, "decoder produced frames");
}

#[test]
fn hardware_request_always_yields_a_working_decoder() {
    let path = sample_video_path();
    if !Path::new(path).exists() {
        return;
    }

    let mut demuxer = Demuxer::open(path).expect("Failed to open fixture");
    let index = demuxer
        .find_best_stream(Type::Video)
        .expect("fixture has video");

    // Whether or not this host can create a device context for any of the
    // codec's device types, open must succeed and decoding must work.
    let options = DecoderOptions::new().with_hardware_acceleration(true);
    let mut decoder: StreamDecoder<ffmpeg_next::frame::Video> =
        StreamDecoder::open(&demuxer.streams()[index], &options).expect("Failed to open decoder");
    let queue = decoder.queue();
    let port = demuxer.port(index).expect("port exists");

    let frame = decoder.decode(|| {
        demuxer.read();
        let produced = demuxer.last_stream_index().is_some();
        if let Some(packet) = port.pull() {
            queue.push(packet);
        }
        produced
    });
    assert!(frame.is_some(), "decoder produced a frame");
}

#[test]
fn decoder_flush_empties_the_queue() {
    let path = sample_video_path();
    if !Path::new(path).exists() {
        return;
    }

    let mut demuxer = Demuxer::open(path).expect("Failed to open fixture");
    let index = demuxer
        .find_best_stream(Type::Video)
        .expect("fixture has video");

    let mut decoder: StreamDecoder<ffmpeg_next::frame::Video> =
        StreamDecoder::open(&demuxer.streams()[index], &DecoderOptions::new())
            .expect("Failed to open decoder");
    let queue = decoder.queue();

    // Stock the queue directly without decoding.
    while queue.is_empty() {
        demuxer.read();
        if let Some(last) = demuxer.last_stream_index() {
            if last == index {
                if let Some(packet) = demuxer.port(index).expect("port exists").pull() {
                    queue.push(packet);
                }
            }
        } else {
            panic!("read error before any packet");
        }
    }

    assert!(!queue.is_empty());
    decoder.flush();
    assert!(queue.is_empty());
}

// ── Clip ─────────────────────────────────────────────────────────

/// Records everything the pipeline hands to the sink.
#[derive(Default)]
struct RecordingSink {
    frames: Mutex<usize>,
    modes: Mutex<Vec<Vec<VideoMode>>>,
    keyframes: Mutex<Vec<bool>>,
    max_pts: Mutex<Option<i64>>,
}

impl UploadSink for RecordingSink {
    fn supported_formats(&self) -> &[ffmpeg_next::format::Pixel] {
        &[]
    }

    fn set_mode_compatibility(&self, modes: &[VideoMode]) {
        self.modes.lock().push(modes.to_vec());
    }

    fn push_frame(&self, frame: &ffmpeg_next::frame::Video) {
        *self.frames.lock() += 1;
        self.keyframes.lock().push(frame.is_key());
        if let Some(pts) = frame.timestamp() {
            let mut max_pts = self.max_pts.lock();
            *max_pts = Some(max_pts.map_or(pts, |current| current.max(pts)));
        }
    }
}

fn software_options() -> ClipOptions {
    ClipOptions::new().with_hardware_acceleration(false)
}

#[test]
fn clip_decodes_to_increasing_targets() {
    let path = sample_video_path();
    if !Path::new(path).exists() {
        return;
    }

    let sink = Arc::new(RecordingSink::default());
    let mut clip =
        Clip::open(path, software_options(), sink.clone()).expect("Failed to open fixture");

    assert!(clip.duration() > 0);
    assert!(clip.frame_period() > 0);
    assert_eq!(clip.position(), 0);
    assert!(!clip.is_playing());

    clip.play();
    assert!(clip.is_playing());

    let period = clip.frame_period();
    for _ in 0..10 {
        clip.advance(period);
        clip.sync().expect("sync");
    }

    assert!(*sink.frames.lock() > 0, "sink received decoded frames");
    assert!(clip.position() <= clip.duration());
}

#[test]
fn clip_reports_one_mode_for_a_constant_stream() {
    let path = sample_video_path();
    if !Path::new(path).exists() {
        return;
    }

    let sink = Arc::new(RecordingSink::default());
    let mut clip =
        Clip::open(path, software_options(), sink.clone()).expect("Failed to open fixture");

    clip.play();
    for _ in 0..5 {
        clip.advance(clip.frame_period());
        clip.sync().expect("sync");
    }

    let notifications = sink.modes.lock().clone();
    assert_eq!(notifications.len(), 1, "one mode change for constant video");
    assert_eq!(notifications[0].len(), 1);
    assert_eq!(clip.mode_compatibility(), notifications[0]);

    let mode = &notifications[0][0];
    assert_ne!(mode.resolution, (0, 0));
    assert!(mode.frame_rate.0 > 0);
}

#[test]
fn paused_clip_does_not_advance() {
    let path = sample_video_path();
    if !Path::new(path).exists() {
        return;
    }

    let mut clip =
        Clip::open(path, software_options(), Arc::new(NullSink)).expect("Failed to open fixture");

    clip.advance(clip.frame_period());
    assert_eq!(clip.position(), 0);

    clip.play();
    clip.advance(clip.frame_period());
    assert!(clip.position() > 0);

    clip.pause();
    let position = clip.position();
    clip.advance(clip.frame_period());
    assert_eq!(clip.position(), position);
}

#[test]
fn seek_clamps_to_the_clip_extent() {
    let path = sample_video_path();
    if !Path::new(path).exists() {
        return;
    }

    let mut clip =
        Clip::open(path, software_options(), Arc::new(NullSink)).expect("Failed to open fixture");

    clip.seek(-5_000_000);
    assert_eq!(clip.position(), 0);

    clip.seek(i64::MAX);
    assert!(clip.position() <= clip.duration());
}

#[test]
fn seeking_backward_still_reaches_the_target() {
    let path = sample_video_path();
    if !Path::new(path).exists() {
        return;
    }

    let sink = Arc::new(RecordingSink::default());
    let mut clip =
        Clip::open(path, software_options(), sink.clone()).expect("Failed to open fixture");

    clip.seek(clip.duration() / 2);
    clip.sync().expect("sync forward");
    let frames_forward = *sink.frames.lock();

    clip.seek(0);
    clip.sync().expect("sync backward");

    assert!(*sink.frames.lock() > frames_forward, "backward seek re-decodes");
    assert_eq!(clip.position(), 0);
}

#[test]
fn discontinuity_seek_resumes_on_a_keyframe() {
    let path = sample_video_path();
    if !Path::new(path).exists() {
        return;
    }

    let sink = Arc::new(RecordingSink::default());
    let mut clip =
        Clip::open(path, software_options(), sink.clone()).expect("Failed to open fixture");

    clip.seek(clip.duration() / 2);
    clip.sync().expect("sync forward");

    let before = sink.keyframes.lock().len();
    clip.seek(clip.duration() / 4);
    clip.sync().expect("sync backward");

    // The backward jump flushed every codec session; the first frame
    // decoded afterwards must be self-contained or it would have been
    // reconstructed against dropped references.
    let keyframes = sink.keyframes.lock();
    assert!(keyframes.len() > before, "backward seek re-decodes");
    assert!(keyframes[before], "decoding resumes on a keyframe");
}

#[test]
fn published_position_never_outruns_decoded_video() {
    let path = sample_video_path();
    if !Path::new(path).exists() {
        return;
    }

    let demuxer = Demuxer::open(path).expect("Failed to open fixture");
    let video = demuxer
        .find_best_stream(Type::Video)
        .expect("fixture has video");
    let time_base = demuxer.streams()[video].time_base();
    drop(demuxer);

    let sink = Arc::new(RecordingSink::default());
    let mut clip =
        Clip::open(path, software_options(), sink.clone()).expect("Failed to open fixture");

    // The published position is gated by the slowest stream, so the video
    // decoder must have covered every position sync() settles on.
    clip.play();
    for _ in 0..10 {
        clip.advance(clip.frame_period());
        clip.sync().expect("sync");

        let Some(max_pts) = *sink.max_pts.lock() else {
            panic!("video frames were decoded");
        };
        let covered = timing::to_clock(max_pts, time_base) + clip.frame_period();
        assert!(
            covered >= clip.position(),
            "decoded video covers the published position"
        );
    }
}

#[test]
fn end_of_stream_invalidates_mode_compatibility() {
    let path = sample_video_path();
    if !Path::new(path).exists() {
        return;
    }

    let sink = Arc::new(RecordingSink::default());
    let mut clip =
        Clip::open(path, software_options(), sink.clone()).expect("Failed to open fixture");

    clip.play();
    loop {
        clip.advance(clip.frame_period());
        clip.sync().expect("sync");
        if clip.position() >= clip.duration() {
            break;
        }
    }

    // The video stream dried up before the last target, so the sink was
    // told the signal is gone without waiting for close().
    assert!(clip.mode_compatibility().is_empty());
    let notifications = sink.modes.lock();
    assert_eq!(notifications.last(), Some(&Vec::new()));
}

#[test]
fn duration_never_grows_across_syncs() {
    let path = sample_video_path();
    if !Path::new(path).exists() {
        return;
    }

    let mut clip =
        Clip::open(path, software_options(), Arc::new(NullSink)).expect("Failed to open fixture");

    let mut previous = clip.duration();
    clip.play();
    loop {
        clip.advance(clip.frame_period());
        clip.sync().expect("sync");

        let duration = clip.duration();
        assert!(duration <= previous, "duration may only shrink");
        previous = duration;

        if clip.position() >= duration {
            break;
        }
    }
}

#[test]
fn close_is_idempotent_and_sync_afterwards_errors() {
    let path = sample_video_path();
    if !Path::new(path).exists() {
        return;
    }

    let mut clip =
        Clip::open(path, software_options(), Arc::new(NullSink)).expect("Failed to open fixture");

    clip.sync().expect("sync before close");
    clip.close();
    clip.close();

    assert!(matches!(clip.sync(), Err(PlayheadError::Closed)));
}
