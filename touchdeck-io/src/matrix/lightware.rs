//! Lightware LW1 protocol (MX series).

use super::{flatten_ties, Geometry, MatrixKind, Tie, Vendor, GEOMETRY_FIELD};
use crate::session::{split_line, Frame, Protocol, Step};

#[derive(Debug, Clone)]
pub struct Lightware {
    geometry: Geometry,
}

impl Protocol for Lightware {
    fn split(&self, buf: &mut Vec<u8>) -> Option<Vec<u8>> {
        split_line(buf)
    }

    fn classify(&mut self, frame: &[u8]) -> Frame {
        let line = String::from_utf8_lossy(frame);
        let line = line.trim();
        let Some(body) = line.strip_prefix('(').and_then(|l| l.strip_suffix(')')) else {
            return Frame::Noise;
        };
        if body.starts_with("ERR") {
            return Frame::Reject(format!("Lightware error {}", body));
        }
        if body.starts_with("MX") {
            return Frame::Ack(vec![(GEOMETRY_FIELD.into(), body.to_string())]);
        }
        Frame::Ack(Vec::new())
    }

    fn handshake(&self) -> Option<Step> {
        if self.geometry.is_known() {
            None
        } else {
            Some(Step::new(b"{i}".to_vec(), 1))
        }
    }
}

impl Vendor for Lightware {
    const KIND: MatrixKind = MatrixKind::Lightware;

    fn new(geometry: Geometry) -> Self {
        Self { geometry }
    }

    /// All ties go out in one write; the switcher confirms each one.
    fn encode(&self, ties: &[Tie]) -> Vec<Step> {
        let pairs = flatten_ties(ties);
        let mut payload = Vec::new();
        for (input, output) in &pairs {
            payload.extend(format!("{{{}@{}}}\r\n", input + 1, output + 1).bytes());
        }
        vec![Step::new(payload, pairs.len())]
    }
}
