use crate::config::PipelineConfig;
use crate::engine::{produced_codec, VideoEncode};
use crate::media::{Dimensions, FrameRate, Options, ScaleTarget};
use crate::pipeline::probe::ProbeReport;

/// How the replacement-frame clip is encoded
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisPlan {
    pub dimensions: Dimensions,
    pub framerate: Option<FrameRate>,
    pub clip_seconds: f64,
    pub video_codec: String,
    pub pixel_format: String,
}

/// How the remainder of the source video is cut
#[derive(Debug, Clone, PartialEq)]
pub struct RemainderPlan {
    pub start_seconds: f64,
    pub duration_seconds: Option<f64>,
    pub video: VideoEncode,
}

/// Encode paths chosen for one run
///
/// | scale target | framerate | native size even | source codec | remainder video |
/// |---|---|---|---|---|
/// | video | unset | yes | clip codec or unknown | stream copy |
/// | video | unset | yes | other | re-encode at native size |
/// | video | unset | no | any | re-encode, scaled to the even size |
/// | video | set | any | any | re-encode at the framerate |
/// | image | any | any | any | re-encode scaled to the image |
///
/// `duration` only caps the remainder. Audio is always copied. The frame clip takes
/// the remainder's framerate and, on the copy path, its pixel format.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodePlan {
    pub synthesis: SynthesisPlan,
    pub remainder: RemainderPlan,
}

impl EncodePlan {
    pub fn decide(options: &Options, probe: &ProbeReport, config: &PipelineConfig) -> Self {
        let target = probe.target;
        let rescale = match options.scale_target {
            ScaleTarget::Image => true,
            ScaleTarget::Video => probe.native_video.map_or(false, |native| native != target),
        };

        // A copied stream keeps its codec; concat cannot splice it onto a clip in another one
        let codec_matches = probe
            .source_codec()
            .map_or(true, |codec| codec == produced_codec(&config.video_codec));

        let video = if options.framerate.is_none() && !rescale && codec_matches {
            VideoEncode::Copy
        } else {
            VideoEncode::Reencode {
                codec: config.video_codec.clone(),
                pixel_format: config.pixel_format.clone(),
                scale: rescale.then_some(target),
                framerate: options.framerate,
            }
        };

        // A copied remainder keeps the source's pixel format, so the frame clip adopts it
        let pixel_format = match (&video, probe.source_pixel_format()) {
            (VideoEncode::Copy, Some(source)) => source.to_string(),
            _ => config.pixel_format.clone(),
        };

        // The frame clip follows the remainder's rate so both segments splice cleanly
        let framerate = options
            .framerate
            .map(FrameRate::whole)
            .or_else(|| probe.source_framerate());

        Self {
            synthesis: SynthesisPlan {
                dimensions: target,
                framerate,
                clip_seconds: config.lead_in_seconds,
                video_codec: config.video_codec.clone(),
                pixel_format,
            },
            remainder: RemainderPlan {
                start_seconds: config.lead_in_seconds,
                duration_seconds: options.duration.map(|d| d - config.lead_in_seconds),
                video,
            },
        }
    }

    pub fn copies_remainder(&self) -> bool {
        self.remainder.video.is_copy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{MediaInfo, VideoStreamInfo};

    fn dims(width: u32, height: u32) -> Dimensions {
        Dimensions { width, height }
    }

    fn video_probe(native: Dimensions) -> ProbeReport {
        ProbeReport {
            target: Dimensions::even_floor(native.width, native.height),
            native_video: Some(native),
            source: Some(MediaInfo {
                duration: Some(10.0),
                has_audio: true,
                video: Some(VideoStreamInfo {
                    codec: "h264".into(),
                    pixel_format: "yuv420p".into(),
                    dimensions: native,
                    framerate: Some(FrameRate::whole(30)),
                }),
            }),
        }
    }

    #[test]
    fn test_plain_run_copies_remainder() {
        let plan = EncodePlan::decide(
            &Options::default(),
            &video_probe(dims(1920, 1080)),
            &PipelineConfig::default(),
        );

        assert!(plan.copies_remainder());
        assert_eq!(plan.remainder.start_seconds, 0.04);
        assert_eq!(plan.remainder.duration_seconds, None);
        assert_eq!(plan.synthesis.dimensions, dims(1920, 1080));
        assert_eq!(plan.synthesis.framerate, Some(FrameRate::whole(30)));
    }

    #[test]
    fn test_framerate_forces_reencode() {
        let options = Options { framerate: Some(24), ..Options::default() };
        let plan = EncodePlan::decide(&options, &video_probe(dims(1920, 1080)), &PipelineConfig::default());

        assert_eq!(
            plan.remainder.video,
            VideoEncode::Reencode {
                codec: "libx264".into(),
                pixel_format: "yuv420p".into(),
                scale: None,
                framerate: Some(24),
            }
        );
        assert_eq!(plan.synthesis.framerate, Some(FrameRate::whole(24)));
    }

    #[test]
    fn test_odd_video_is_rescaled() {
        let plan = EncodePlan::decide(
            &Options::default(),
            &video_probe(dims(1921, 1081)),
            &PipelineConfig::default(),
        );

        match plan.remainder.video {
            VideoEncode::Reencode { scale, framerate, .. } => {
                assert_eq!(scale, Some(dims(1920, 1080)));
                assert_eq!(framerate, None);
            }
            VideoEncode::Copy => panic!("odd sizes cannot be stream copied"),
        }
    }

    #[test]
    fn test_image_target_always_rescales() {
        let mut probe = video_probe(dims(1280, 720));
        probe.target = dims(800, 600);
        probe.native_video = None;
        let options = Options { scale_target: ScaleTarget::Image, ..Options::default() };

        let plan = EncodePlan::decide(&options, &probe, &PipelineConfig::default());
        assert!(!plan.copies_remainder());
        assert_eq!(plan.synthesis.dimensions, dims(800, 600));
        assert!(matches!(
            plan.remainder.video,
            VideoEncode::Reencode { scale: Some(d), .. } if d == dims(800, 600)
        ));
    }

    #[test]
    fn test_duration_caps_remainder() {
        let options = Options { duration: Some(5.0), ..Options::default() };
        let plan = EncodePlan::decide(&options, &video_probe(dims(640, 480)), &PipelineConfig::default());

        assert!(plan.copies_remainder());
        let capped = plan.remainder.duration_seconds.unwrap();
        assert!((capped - 4.96).abs() < 1e-9);
    }

    #[test]
    fn test_copy_path_adopts_source_pixel_format() {
        let mut probe = video_probe(dims(640, 480));
        if let Some(video) = probe.source.as_mut().and_then(|s| s.video.as_mut()) {
            video.pixel_format = "yuv444p".into();
        }

        let plan = EncodePlan::decide(&Options::default(), &probe, &PipelineConfig::default());
        assert!(plan.copies_remainder());
        assert_eq!(plan.synthesis.pixel_format, "yuv444p");

        let options = Options { framerate: Some(25), ..Options::default() };
        let plan = EncodePlan::decide(&options, &probe, &PipelineConfig::default());
        assert_eq!(plan.synthesis.pixel_format, "yuv420p");
    }

    #[test]
    fn test_foreign_codec_is_reencoded_at_native_size() {
        let mut probe = video_probe(dims(1920, 1080));
        if let Some(video) = probe.source.as_mut().and_then(|s| s.video.as_mut()) {
            video.codec = "hevc".into();
            video.framerate = FrameRate::parse("30000/1001");
        }

        let plan = EncodePlan::decide(&Options::default(), &probe, &PipelineConfig::default());
        assert_eq!(
            plan.remainder.video,
            VideoEncode::Reencode {
                codec: "libx264".into(),
                pixel_format: "yuv420p".into(),
                scale: None,
                framerate: None,
            }
        );
        assert_eq!(plan.synthesis.pixel_format, "yuv420p");
        assert_eq!(plan.synthesis.framerate, FrameRate::parse("30000/1001"));
    }

    #[test]
    fn test_unknown_source_stream_is_copied() {
        let mut probe = video_probe(dims(640, 480));
        probe.source = None;

        let plan = EncodePlan::decide(&Options::default(), &probe, &PipelineConfig::default());
        assert!(plan.copies_remainder());
        assert_eq!(plan.synthesis.framerate, None);
    }
}
