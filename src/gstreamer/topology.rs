//! Pipeline topologies as data
//!
//! Each receiver source kind and transmitter destination kind maps to a fixed,
//! linearly linked chain of [`StageSpec`]s. Nothing here touches GStreamer;
//! [`super::stage`] turns the specs into elements.

use super::PipelineError;
use crate::config::{ReceiverConfig, SinkKind, SourceKind, TransmitterConfig};
use std::fmt;
use std::time::Duration;

/// RTP payload type used by both ends
pub const RTP_PAYLOAD_TYPE: i32 = 96;

/// RTP video clock rate
pub const RTP_CLOCK_RATE: i32 = 90_000;

/// Name of the appsink delivering decoded frames
pub const FRAME_SINK: &str = "frame-sink";

/// Name of the appsrc accepting published frames
pub const FRAME_SOURCE: &str = "frame-source";

/// A capability field value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapsField {
    Str(String),
    Int(i32),
    Fraction(i32, i32),
}

/// Capability filter description
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapsSpec {
    pub media_type: &'static str,
    pub fields: Vec<(&'static str, CapsField)>,
}

impl CapsSpec {
    pub fn new(media_type: &'static str) -> Self {
        Self {
            media_type,
            fields: Vec::new(),
        }
    }

    pub fn str(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.fields.push((name, CapsField::Str(value.into())));
        self
    }

    pub fn int(mut self, name: &'static str, value: i32) -> Self {
        self.fields.push((name, CapsField::Int(value)));
        self
    }

    pub fn fraction(mut self, name: &'static str, num: i32, den: i32) -> Self {
        self.fields.push((name, CapsField::Fraction(num, den)));
        self
    }

    pub fn field(&self, name: &str) -> Option<&CapsField> {
        self.fields.iter().find(|(n, _)| *n == name).map(|(_, v)| v)
    }
}

impl fmt::Display for CapsSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.media_type)?;
        for (name, value) in &self.fields {
            match value {
                CapsField::Str(v) => write!(f, ",{}={}", name, v)?,
                CapsField::Int(v) => write!(f, ",{}={}", name, v)?,
                CapsField::Fraction(n, d) => write!(f, ",{}={}/{}", name, n, d)?,
            }
        }
        Ok(())
    }
}

/// A stage property value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageProperty {
    /// Plain string property
    Str(String),
    /// Enum or flags property given by nick
    Nick(&'static str),
    Int(i32),
    UInt(u32),
    Bool(bool),
    Caps(CapsSpec),
}

impl fmt::Display for StageProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageProperty::Str(v) => write!(f, "{}", v),
            StageProperty::Nick(v) => write!(f, "{}", v),
            StageProperty::Int(v) => write!(f, "{}", v),
            StageProperty::UInt(v) => write!(f, "{}", v),
            StageProperty::Bool(v) => write!(f, "{}", v),
            StageProperty::Caps(c) => write!(f, "\"{}\"", c),
        }
    }
}

/// One named, configurable stage of a linear pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageSpec {
    /// Element factory name
    pub factory: &'static str,
    /// Element instance name, unique within the pipeline
    pub name: String,
    pub properties: Vec<(&'static str, StageProperty)>,
}

impl StageSpec {
    pub fn new(factory: &'static str, name: impl Into<String>) -> Self {
        Self {
            factory,
            name: name.into(),
            properties: Vec::new(),
        }
    }

    /// Capsfilter stage
    pub fn caps_filter(name: impl Into<String>, caps: CapsSpec) -> Self {
        Self::new("capsfilter", name).with("caps", StageProperty::Caps(caps))
    }

    pub fn with(mut self, key: &'static str, value: StageProperty) -> Self {
        self.properties.push((key, value));
        self
    }

    pub fn property(&self, key: &str) -> Option<&StageProperty> {
        self.properties.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }
}

impl fmt::Display for StageSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} name={}", self.factory, self.name)?;
        for (key, value) in &self.properties {
            write!(f, " {}={}", key, value)?;
        }
        Ok(())
    }
}

/// Render a chain in gst-launch notation
pub fn describe(stages: &[StageSpec]) -> String {
    stages
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(" ! ")
}

/// Camera source element for the current platform
pub fn usb_source_factory() -> &'static str {
    if cfg!(target_os = "windows") {
        "ksvideosrc"
    } else if cfg!(target_os = "macos") {
        "avfvideosrc"
    } else {
        "v4l2src"
    }
}

fn dim(value: u32, what: &str) -> Result<i32, PipelineError> {
    if value == 0 {
        return Err(PipelineError::InvalidConfig(format!("{} must be non-zero", what)));
    }
    i32::try_from(value)
        .map_err(|_| PipelineError::InvalidConfig(format!("{} {} is out of range", what, value)))
}

fn usb_source(config: &ReceiverConfig, width: i32, height: i32) -> Vec<StageSpec> {
    let factory = usb_source_factory();
    let mut source = StageSpec::new(factory, "usb-source");
    if let Some(device) = config.device.as_deref().filter(|d| !d.is_empty()) {
        match factory {
            "v4l2src" => source = source.with("device", StageProperty::Str(device.to_string())),
            "ksvideosrc" => {
                source = source.with("device-path", StageProperty::Str(device.to_string()))
            }
            _ => {}
        }
    }

    let caps = CapsSpec::new("video/x-raw")
        .int("width", width)
        .int("height", height)
        .str("format", "YUY2");

    vec![source, StageSpec::caps_filter("source-caps", caps)]
}

fn rtp_source(config: &ReceiverConfig, encoding: &'static str) -> Vec<StageSpec> {
    let (depay, parse, decode) = match encoding {
        "H265" => ("rtph265depay", "h265parse", "avdec_h265"),
        _ => ("rtph264depay", "h264parse", "avdec_h264"),
    };

    let mut source = StageSpec::new("udpsrc", "udp-source")
        .with("port", StageProperty::Int(i32::from(config.port)));
    if let Some(address) = config.address.as_deref().filter(|a| !a.is_empty()) {
        source = source.with("address", StageProperty::Str(address.to_string()));
    }
    if let Some(iface) = config.interface.as_deref().filter(|i| !i.is_empty()) {
        source = source.with("multicast-iface", StageProperty::Str(iface.to_string()));
    }

    let caps = CapsSpec::new("application/x-rtp")
        .str("media", "video")
        .int("clock-rate", RTP_CLOCK_RATE)
        .str("encoding-name", encoding)
        .int("payload", RTP_PAYLOAD_TYPE);

    let codec = encoding.to_ascii_lowercase();
    vec![
        source,
        StageSpec::caps_filter("source-caps", caps),
        StageSpec::new(depay, format!("{}-depayloader", codec)),
        StageSpec::new(parse, format!("{}-parser", codec)),
        StageSpec::new("queue", "decode-queue"),
        StageSpec::new(decode, format!("{}-decoder", codec)),
    ]
}

/// Receiver chain, from source to the frame appsink
pub fn receiver_topology(config: &ReceiverConfig) -> Result<Vec<StageSpec>, PipelineError> {
    let width = dim(config.width, "width")?;
    let height = dim(config.height, "height")?;
    let format = config.frame_format();
    format.validate()?;
    let raw_format = format.raw_format()?;

    let mut stages = match config.source {
        SourceKind::Usb => usb_source(config, width, height),
        SourceKind::H264 => rtp_source(config, "H264"),
        SourceKind::H265 => rtp_source(config, "H265"),
    };

    let output_caps = CapsSpec::new("video/x-raw")
        .int("width", width)
        .int("height", height)
        .str("format", raw_format);

    stages.push(StageSpec::new("videoconvert", "converter"));
    stages.push(StageSpec::caps_filter("output-caps", output_caps));
    stages.push(
        StageSpec::new("appsink", FRAME_SINK)
            .with("sync", StageProperty::Bool(false))
            .with("max-buffers", StageProperty::UInt(2))
            .with("drop", StageProperty::Bool(true)),
    );

    Ok(stages)
}

fn encoder_chain(
    config: &TransmitterConfig,
    width: i32,
    height: i32,
    framerate: i32,
) -> Vec<StageSpec> {
    let (encoder, media_type, payloader, codec) = match config.destination {
        SinkKind::H265 => ("x265enc", "video/x-h265", "rtph265pay", "h265"),
        _ => ("x264enc", "video/x-h264", "rtph264pay", "h264"),
    };

    let encoded_caps = CapsSpec::new(media_type)
        .int("width", width)
        .int("height", height)
        .fraction("framerate", framerate, 1);

    vec![
        StageSpec::caps_filter("raw-caps", CapsSpec::new("video/x-raw").str("format", "I420")),
        StageSpec::new(encoder, format!("{}-encoder", codec))
            .with("tune", StageProperty::Nick("zerolatency")),
        StageSpec::caps_filter("encoded-caps", encoded_caps),
        StageSpec::new(payloader, format!("{}-payloader", codec))
            .with("config-interval", StageProperty::Int(1))
            .with("pt", StageProperty::UInt(RTP_PAYLOAD_TYPE as u32)),
        StageSpec::new("udpsink", "udp-sink")
            .with("host", StageProperty::Str(config.host.clone()))
            .with("port", StageProperty::Int(i32::from(config.port)))
            .with("sync", StageProperty::Bool(false))
            .with("async", StageProperty::Bool(false)),
    ]
}

/// Transmitter chain, from the frame appsrc to the sink
pub fn transmitter_topology(config: &TransmitterConfig) -> Result<Vec<StageSpec>, PipelineError> {
    let width = dim(config.width, "width")?;
    let height = dim(config.height, "height")?;
    let framerate = dim(config.framerate, "framerate")?;
    let format = config.frame_format();
    format.validate()?;
    let raw_format = format.raw_format()?;

    let input_caps = CapsSpec::new("video/x-raw")
        .str("format", raw_format)
        .int("width", width)
        .int("height", height)
        .fraction("framerate", framerate, 1);

    let mut stages = vec![
        StageSpec::new("appsrc", FRAME_SOURCE)
            .with("caps", StageProperty::Caps(input_caps))
            .with("stream-type", StageProperty::Nick("stream"))
            .with("is-live", StageProperty::Bool(true))
            .with("format", StageProperty::Nick("time")),
        StageSpec::new("queue", "feed-queue"),
        StageSpec::new("videoconvert", "converter"),
    ];

    match config.destination {
        SinkKind::H264 | SinkKind::H265 => {
            stages.extend(encoder_chain(config, width, height, framerate));
        }
        SinkKind::Display => stages.push(StageSpec::new("autovideosink", "display-sink")),
    }

    Ok(stages)
}

/// Duration of one frame at `framerate` frames per second
pub fn frame_duration(framerate: u32) -> Duration {
    Duration::from_nanos(1_000_000_000 / u64::from(framerate.max(1)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn factories(stages: &[StageSpec]) -> Vec<&'static str> {
        stages.iter().map(|s| s.factory).collect()
    }

    fn rx(source: SourceKind) -> ReceiverConfig {
        ReceiverConfig {
            source,
            ..ReceiverConfig::default()
        }
    }

    fn tx(destination: SinkKind) -> TransmitterConfig {
        TransmitterConfig {
            destination,
            ..TransmitterConfig::default()
        }
    }

    #[test]
    fn h264_receiver_chain() {
        let stages = receiver_topology(&rx(SourceKind::H264)).unwrap();
        assert_eq!(
            factories(&stages),
            [
                "udpsrc",
                "capsfilter",
                "rtph264depay",
                "h264parse",
                "queue",
                "avdec_h264",
                "videoconvert",
                "capsfilter",
                "appsink"
            ]
        );
        assert_eq!(stages[0].property("port"), Some(&StageProperty::Int(5000)));
        match stages[1].property("caps") {
            Some(StageProperty::Caps(caps)) => {
                assert_eq!(caps.field("encoding-name"), Some(&CapsField::Str("H264".into())));
                assert_eq!(caps.field("payload"), Some(&CapsField::Int(96)));
            }
            other => panic!("unexpected caps property {:?}", other),
        }
    }

    #[test]
    fn h265_receiver_uses_h265_stages() {
        let stages = receiver_topology(&rx(SourceKind::H265)).unwrap();
        let names = factories(&stages);
        assert!(names.contains(&"rtph265depay"));
        assert!(names.contains(&"h265parse"));
        assert!(names.contains(&"avdec_h265"));
        assert!(!names.contains(&"avdec_h264"));
    }

    #[test]
    fn usb_receiver_chain() {
        let mut config = rx(SourceKind::Usb);
        config.device = Some("/dev/video2".into());
        let stages = receiver_topology(&config).unwrap();
        assert_eq!(stages[0].factory, usb_source_factory());
        assert_eq!(stages.len(), 5);
        match stages[1].property("caps") {
            Some(StageProperty::Caps(caps)) => {
                assert_eq!(caps.to_string(), "video/x-raw,width=640,height=480,format=YUY2");
            }
            other => panic!("unexpected caps property {:?}", other),
        }
        if usb_source_factory() == "v4l2src" {
            assert_eq!(
                stages[0].property("device"),
                Some(&StageProperty::Str("/dev/video2".into()))
            );
        }
    }

    #[test]
    fn network_receiver_options_are_applied() {
        let mut config = rx(SourceKind::H264);
        config.address = Some("239.0.0.5".into());
        config.interface = Some("eth1".into());
        let stages = receiver_topology(&config).unwrap();
        assert_eq!(
            stages[0].property("address"),
            Some(&StageProperty::Str("239.0.0.5".into()))
        );
        assert_eq!(
            stages[0].property("multicast-iface"),
            Some(&StageProperty::Str("eth1".into()))
        );

        let stages = receiver_topology(&rx(SourceKind::H264)).unwrap();
        assert!(stages[0].property("address").is_none());
    }

    #[test]
    fn receiver_output_caps_follow_channels() {
        let mut config = rx(SourceKind::Usb);
        config.channels = 4;
        let stages = receiver_topology(&config).unwrap();
        let output = &stages[stages.len() - 2];
        match output.property("caps") {
            Some(StageProperty::Caps(caps)) => {
                assert_eq!(caps.field("format"), Some(&CapsField::Str("BGRx".into())));
            }
            other => panic!("unexpected caps property {:?}", other),
        }

        config.channels = 5;
        assert!(receiver_topology(&config).is_err());
    }

    #[test]
    fn zero_dimensions_are_rejected() {
        let mut config = rx(SourceKind::H264);
        config.height = 0;
        assert!(matches!(
            receiver_topology(&config),
            Err(PipelineError::InvalidConfig(_))
        ));

        let mut config = tx(SinkKind::H264);
        config.framerate = 0;
        assert!(transmitter_topology(&config).is_err());
    }

    #[test]
    fn oversized_frames_are_rejected() {
        let mut config = rx(SourceKind::Usb);
        config.width = 100_000;
        config.height = 100_000;
        config.channels = 4;
        assert!(matches!(
            receiver_topology(&config),
            Err(PipelineError::InvalidConfig(_))
        ));

        let mut config = tx(SinkKind::Display);
        config.width = 100_000;
        config.height = 100_000;
        assert!(matches!(
            transmitter_topology(&config),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn h264_transmitter_chain() {
        let stages = transmitter_topology(&tx(SinkKind::H264)).unwrap();
        assert_eq!(
            factories(&stages),
            [
                "appsrc",
                "queue",
                "videoconvert",
                "capsfilter",
                "x264enc",
                "capsfilter",
                "rtph264pay",
                "udpsink"
            ]
        );
        let sink = stages.last().unwrap();
        assert_eq!(sink.property("host"), Some(&StageProperty::Str("127.0.0.1".into())));
        assert_eq!(sink.property("sync"), Some(&StageProperty::Bool(false)));
        assert_eq!(sink.property("async"), Some(&StageProperty::Bool(false)));
    }

    #[test]
    fn h265_transmitter_uses_distinct_stages() {
        let stages = transmitter_topology(&tx(SinkKind::H265)).unwrap();
        assert_eq!(
            &factories(&stages)[3..],
            ["capsfilter", "x265enc", "capsfilter", "rtph265pay", "udpsink"]
        );

        let mut names: Vec<&str> = stages.iter().map(|s| s.name.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), stages.len());
    }

    #[test]
    fn display_transmitter_chain() {
        let stages = transmitter_topology(&tx(SinkKind::Display)).unwrap();
        assert_eq!(
            factories(&stages),
            ["appsrc", "queue", "videoconvert", "autovideosink"]
        );
    }

    #[test]
    fn appsrc_caps_carry_framerate() {
        let mut config = tx(SinkKind::Display);
        config.framerate = 15;
        let stages = transmitter_topology(&config).unwrap();
        match stages[0].property("caps") {
            Some(StageProperty::Caps(caps)) => assert_eq!(
                caps.to_string(),
                "video/x-raw,format=BGR,width=640,height=480,framerate=15/1"
            ),
            other => panic!("unexpected caps property {:?}", other),
        }
    }

    #[test]
    fn describe_joins_stages() {
        let stages = vec![
            StageSpec::new("queue", "q"),
            StageSpec::new("udpsink", "out").with("port", StageProperty::Int(5000)),
        ];
        assert_eq!(describe(&stages), "queue name=q ! udpsink name=out port=5000");
    }

    #[test]
    fn frame_duration_from_framerate() {
        assert_eq!(frame_duration(4), Duration::from_millis(250));
        assert_eq!(frame_duration(30), Duration::from_nanos(33_333_333));
        assert_eq!(frame_duration(0), Duration::from_secs(1));
    }
}
