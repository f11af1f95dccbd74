//! Camera target derivation.
//!
//! Turns a fleet size and an addressing scheme into the ordered list of
//! endpoints the pipeline probes. No I/O and no failure modes; an
//! addressing scheme that runs out of octets or ports yields fewer targets.

use serde::Serialize;
use tracing::warn;

use crate::config::CameraConfig;

/// Identity and connection details for one camera in a fleet run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CameraTarget {
    /// 1-based, unique within a run.
    pub camera_number: u32,
    pub ip_address: String,
    pub source_endpoint: String,
    pub re_stream_endpoint: String,
    pub re_stream_port: u16,
}

impl CameraTarget {
    /// Display name used in logs and reports.
    pub fn name(&self) -> String {
        format!("Camera {}", self.camera_number)
    }
}

/// Builds `camera_count` targets numbered 1..=N.
///
/// Host octet and re-stream port both advance by one per camera. A camera
/// whose octet or port would overflow is not generated, nor is any camera
/// after it; a warning names how many were dropped.
pub fn generate_targets(config: &CameraConfig) -> Vec<CameraTarget> {
    let mut targets = Vec::with_capacity(config.camera_count as usize);

    for index in 0..config.camera_count {
        let octet = config.start_octet.checked_add(index);
        let re_stream_port = u16::try_from(index)
            .ok()
            .and_then(|offset| config.re_stream_base_port.checked_add(offset));
        let (Some(octet), Some(re_stream_port)) = (octet, re_stream_port) else {
            warn!(
                camera = index + 1,
                requested = config.camera_count,
                dropped = config.camera_count - index,
                start_octet = config.start_octet,
                re_stream_base_port = config.re_stream_base_port,
                "Addressing scheme exhausted, remaining cameras not generated"
            );
            break;
        };

        let ip_address = format!("{}.{}", config.base_ip, octet);
        let source_endpoint = format!(
            "rtsp://{}:{}@{}:{}/{}",
            config.username, config.password, ip_address, config.source_port, config.stream_path
        );
        let re_stream_endpoint = format!(
            "rtsp://{}:{}/{}",
            config.re_stream_host, re_stream_port, config.re_stream_path
        );

        targets.push(CameraTarget {
            camera_number: index + 1,
            ip_address,
            source_endpoint,
            re_stream_endpoint,
            re_stream_port,
        });
    }

    targets
}
