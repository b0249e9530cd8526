//! Extron SIS (Simple Instruction Set), as spoken by the DXP series.

use super::{flatten_ties, Geometry, MatrixKind, Tie, Vendor, GEOMETRY_FIELD};
use crate::session::{split_line, Frame, Protocol, Step};

const INFO_REQUEST: &[u8] = b"I";

/// Which reply completes the command in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Awaiting {
    Info,
    Tie,
}

#[derive(Debug, Clone)]
pub struct Extron {
    geometry: Geometry,
    awaiting: Awaiting,
}

impl Protocol for Extron {
    fn split(&self, buf: &mut Vec<u8>) -> Option<Vec<u8>> {
        split_line(buf)
    }

    fn classify(&mut self, frame: &[u8]) -> Frame {
        let line = String::from_utf8_lossy(frame).trim().to_ascii_lowercase();
        let bytes = line.as_bytes();
        // Error codes: "E01" .. "E99".
        if bytes.len() == 3 && bytes[0] == b'e' && bytes[1..].iter().all(u8::is_ascii_digit) {
            return Frame::Reject(format!("Extron error {}", line.to_ascii_uppercase()));
        }
        match self.awaiting {
            // Information reply: "V8X8 A8X8".
            Awaiting::Info
                if bytes.first() == Some(&b'v')
                    && bytes.get(1).is_some_and(u8::is_ascii_digit)
                    && line.contains(" a") =>
            {
                Frame::Ack(vec![(GEOMETRY_FIELD.into(), line[1..].to_string())])
            }
            Awaiting::Tie if line.starts_with("qik") || line.starts_with("out") => {
                Frame::Ack(Vec::new())
            }
            // Login banners and replies to someone else's command.
            _ => Frame::Noise,
        }
    }

    fn begin(&mut self, step: &Step) {
        self.awaiting = if step.payload == INFO_REQUEST {
            Awaiting::Info
        } else {
            Awaiting::Tie
        };
    }

    fn handshake(&self) -> Option<Step> {
        if self.geometry.is_known() {
            None
        } else {
            Some(Step::new(INFO_REQUEST.to_vec(), 1))
        }
    }
}

impl Vendor for Extron {
    const KIND: MatrixKind = MatrixKind::Extron;

    fn new(geometry: Geometry) -> Self {
        Self {
            geometry,
            awaiting: Awaiting::Tie,
        }
    }

    fn encode(&self, ties: &[Tie]) -> Vec<Step> {
        let pairs = flatten_ties(ties);
        if let [(input, output)] = pairs.as_slice() {
            return vec![Step::new(format!("{}*{}!", input + 1, output + 1), 1)];
        }
        let mut payload = b"\x1b+Q".to_vec();
        for (input, output) in pairs {
            payload.extend(format!("{}*{}!", input + 1, output + 1).bytes());
        }
        payload.extend(b"\r\n");
        vec![Step::new(payload, 1)]
    }
}
