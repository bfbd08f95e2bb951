//! V4L2 capture through GStreamer
//!
//! The pipeline keeps a single buffer and drops anything older, so a read
//! always returns the newest frame the device produced:
//!
//! `v4l2src ! [mode caps] ! videoconvert ! video/x-raw,format=BGR ! appsink max-buffers=1 drop=true sync=false`

use common::{BridgeError, ColorOrder, Frame};
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use std::sync::OnceLock;

use super::{CaptureSource, DeviceSettings};

/// How long opening the device may take before giving up
const OPEN_TIMEOUT_SECS: u64 = 5;

/// Initialize GStreamer (idempotent, safe to call multiple times)
fn initialize_gstreamer() -> Result<(), BridgeError> {
    static GSTREAMER_INITIALIZED: OnceLock<Result<(), String>> = OnceLock::new();

    GSTREAMER_INITIALIZED
        .get_or_init(|| {
            gst::init().map_err(|e| e.to_string())?;
            log::info!("GStreamer initialized");
            Ok(())
        })
        .clone()
        .map_err(BridgeError::CaptureOpen)
}

/// Quote a property value for a pipeline description
fn quote_property(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Human readable summary of a negotiated mode
fn describe_mode(format: &str, width: u32, height: u32, fps: (i32, i32)) -> String {
    let rate = match fps {
        (0, _) | (_, 0) => "variable".to_string(),
        (numer, 1) => format!("{} fps", numer),
        (numer, denom) => format!("{:.2} fps", numer as f64 / denom as f64),
    };
    format!("{}x{} {} @ {}", width, height, format, rate)
}

/// Pipeline description for `settings`
fn pipeline_description(settings: &DeviceSettings) -> String {
    let mut mode = vec!["video/x-raw".to_string()];
    if settings.width > 0 {
        mode.push(format!("width={}", settings.width));
    }
    if settings.height > 0 {
        mode.push(format!("height={}", settings.height));
    }
    if settings.fps > 0 {
        mode.push(format!("framerate={}/1", settings.fps));
    }

    let mode_filter = if mode.len() > 1 {
        format!("{} ! ", mode.join(","))
    } else {
        String::new()
    };

    format!(
        "v4l2src device={} ! {}videoconvert ! video/x-raw,format=BGR ! appsink name=sink max-buffers=1 drop=true sync=false",
        quote_property(&settings.device_path()),
        mode_filter
    )
}

/// Last error posted on the pipeline bus, if any
fn bus_error(pipeline: &gst::Pipeline) -> Option<String> {
    let message = pipeline.bus()?.pop_filtered(&[gst::MessageType::Error])?;
    match message.view() {
        gst::MessageView::Error(err) => Some(err.error().to_string()),
        _ => None,
    }
}

pub struct GstCaptureSource {
    pipeline: gst::Pipeline,
    sink: gst_app::AppSink,
    read_timeout: gst::ClockTime,
    description: String,
    /// Last negotiated `(width, height)`, logged when it changes
    mode: Option<(u32, u32)>,
    closed: bool,
}

impl GstCaptureSource {
    /// Open the device and start streaming.
    pub fn open(settings: &DeviceSettings) -> Result<Self, BridgeError> {
        initialize_gstreamer()?;

        let description = pipeline_description(settings);
        log::debug!("GStreamer pipeline: {}", description);

        let pipeline = gst::parse::launch(&description)
            .map_err(|e| BridgeError::CaptureOpen(format!("create pipeline: {}", e)))?
            .dynamic_cast::<gst::Pipeline>()
            .map_err(|_| BridgeError::CaptureOpen("not a gst::Pipeline".to_string()))?;

        let sink = pipeline
            .by_name("sink")
            .and_then(|element| element.dynamic_cast::<gst_app::AppSink>().ok())
            .ok_or_else(|| BridgeError::CaptureOpen("appsink missing from pipeline".to_string()))?;

        let mut source = Self {
            pipeline,
            sink,
            read_timeout: gst::ClockTime::from_mseconds(settings.read_timeout.as_millis() as u64),
            description: settings.device_path(),
            mode: None,
            closed: false,
        };

        // From here on `source` closes the pipeline on every exit path
        if source.pipeline.set_state(gst::State::Playing).is_err() {
            let reason = bus_error(&source.pipeline).unwrap_or_else(|| "state change failed".into());
            source.close();
            return Err(BridgeError::CaptureOpen(format!(
                "{}: {}",
                source.description, reason
            )));
        }

        let (result, _, _) = source
            .pipeline
            .state(gst::ClockTime::from_seconds(OPEN_TIMEOUT_SECS));
        if result.is_err() {
            let reason = bus_error(&source.pipeline).unwrap_or_else(|| "device did not start".into());
            source.close();
            return Err(BridgeError::CaptureOpen(format!(
                "{}: {}",
                source.description, reason
            )));
        }

        log::info!("Opened capture device {}", source.description);
        Ok(source)
    }
}

impl CaptureSource for GstCaptureSource {
    fn name(&self) -> &str {
        &self.description
    }

    fn read_into(&mut self, frame: &mut Frame) -> Result<(), BridgeError> {
        if self.closed {
            return Err(BridgeError::CaptureRead("device closed".to_string()));
        }

        let sample = self.sink.try_pull_sample(self.read_timeout).ok_or_else(|| {
            let reason = if self.sink.is_eos() {
                "end of stream"
            } else {
                "timed out waiting for a frame"
            };
            BridgeError::CaptureRead(reason.to_string())
        })?;

        let caps = sample
            .caps()
            .ok_or_else(|| BridgeError::CaptureRead("sample without caps".to_string()))?;
        let info = gst_video::VideoInfo::from_caps(caps)
            .map_err(|e| BridgeError::CaptureRead(format!("unreadable caps: {}", e)))?;
        if self.mode != Some((info.width(), info.height())) {
            self.mode = Some((info.width(), info.height()));
            let fps = info.fps();
            log::info!(
                "Capturing {} from {}",
                describe_mode(
                    info.format().to_str(),
                    info.width(),
                    info.height(),
                    (fps.numer(), fps.denom())
                ),
                self.description
            );
        }

        let buffer = sample
            .buffer()
            .ok_or_else(|| BridgeError::CaptureRead("sample without buffer".to_string()))?;
        let map = buffer
            .map_readable()
            .map_err(|e| BridgeError::CaptureRead(format!("map buffer: {}", e)))?;

        let stride = info
            .stride()
            .first()
            .and_then(|s| usize::try_from(*s).ok())
            .unwrap_or(0);

        frame.fill_from(
            map.as_slice(),
            info.width(),
            info.height(),
            stride,
            ColorOrder::Bgr,
        );
        Ok(())
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        match self.pipeline.set_state(gst::State::Null) {
            Ok(_) => log::debug!("Closed capture device {}", self.description),
            Err(e) => log::warn!("Failed to stop capture pipeline: {}", e),
        }
    }
}

impl Drop for GstCaptureSource {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn settings(width: u32, height: u32, fps: u32) -> DeviceSettings {
        DeviceSettings {
            device: "0".into(),
            width,
            height,
            fps,
            read_timeout: Duration::from_millis(100),
        }
    }

    #[test]
    fn test_pipeline_with_mode() {
        let description = pipeline_description(&settings(1920, 1080, 60));
        assert!(description.starts_with("v4l2src device=\"/dev/video0\" ! "));
        assert!(description.contains("video/x-raw,width=1920,height=1080,framerate=60/1 ! videoconvert"));
        assert!(description.contains("format=BGR"));
        assert!(description.ends_with("max-buffers=1 drop=true sync=false"));
    }

    #[test]
    fn test_pipeline_without_mode() {
        let description = pipeline_description(&settings(0, 0, 0));
        assert!(description.contains("v4l2src device=\"/dev/video0\" ! videoconvert"));
    }

    #[test]
    fn test_device_path_is_quoted() {
        let mut settings = settings(0, 0, 0);
        settings.device = "/dev/v4l/by-id/usb-Capture Card ! fakesink".into();
        let description = pipeline_description(&settings);
        assert!(description.starts_with(
            "v4l2src device=\"/dev/v4l/by-id/usb-Capture Card ! fakesink\" ! videoconvert"
        ));

        assert_eq!(quote_property(r#"a"b\c"#), r#""a\"b\\c""#);
    }

    #[test]
    fn test_describe_mode() {
        assert_eq!(describe_mode("BGR", 1920, 1080, (60, 1)), "1920x1080 BGR @ 60 fps");
        assert_eq!(
            describe_mode("BGR", 1280, 720, (30000, 1001)),
            "1280x720 BGR @ 29.97 fps"
        );
        assert_eq!(describe_mode("BGR", 640, 480, (0, 1)), "640x480 BGR @ variable");
    }
}
