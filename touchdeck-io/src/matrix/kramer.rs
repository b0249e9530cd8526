//! Kramer Protocol 2000: fixed four-byte binary frames.
//!
//! Request: `[instruction, 0x80 | input, 0x80 | output, 0x80 | machine]`.
//! The reply echoes the frame with bit 6 of the first byte set;
//! instruction 16 in a reply signals an error.

use super::{flatten_ties, Geometry, MatrixKind, Tie, Vendor};
use crate::session::{Frame, Protocol, Step};

const SWITCH_VIDEO: u8 = 0x01;
const ERROR: u8 = 0x10;
const REPLY_FLAG: u8 = 0x40;
const MACHINE: u8 = 0x01;
const FRAME_LEN: usize = 4;
/// Port numbers travel as seven bits, and wire port 0 means "all".
const PORTS: usize = 0x7f;

#[derive(Debug, Clone)]
pub struct Kramer {
    geometry: Geometry,
}

impl Kramer {
    /// `None` when either port is beyond what a frame can address.
    pub fn frame(input: usize, output: usize) -> Option<[u8; FRAME_LEN]> {
        let wire = |port: usize| u8::try_from(port).ok().filter(|p| usize::from(*p) < PORTS);
        Some([SWITCH_VIDEO, 0x80 | (wire(input)? + 1), 0x80 | (wire(output)? + 1), 0x80 | MACHINE])
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }
}

impl Protocol for Kramer {
    fn split(&self, buf: &mut Vec<u8>) -> Option<Vec<u8>> {
        // A frame starts with the only byte whose top bit is clear.
        let start = buf.iter().position(|b| b & 0x80 == 0)?;
        buf.drain(..start);
        if buf.len() < FRAME_LEN {
            return None;
        }
        Some(buf.drain(..FRAME_LEN).collect())
    }

    fn classify(&mut self, frame: &[u8]) -> Frame {
        let Some(&first) = frame.first() else {
            return Frame::Noise;
        };
        if first & REPLY_FLAG == 0 {
            return Frame::Noise;
        }
        match first & 0x3f {
            SWITCH_VIDEO => Frame::Ack(Vec::new()),
            ERROR => Frame::Reject(format!(
                "Kramer error code {}",
                frame.get(1).map(|b| b & 0x7f).unwrap_or(0)
            )),
            _ => Frame::Noise,
        }
    }
}

impl Vendor for Kramer {
    const KIND: MatrixKind = MatrixKind::Kramer;
    const PORT_LIMIT: Option<usize> = Some(PORTS);

    fn new(geometry: Geometry) -> Self {
        Self { geometry }
    }

    fn encode(&self, ties: &[Tie]) -> Vec<Step> {
        flatten_ties(ties)
            .into_iter()
            .filter_map(|(input, output)| Kramer::frame(input, output))
            .map(|frame| Step::new(frame.to_vec(), 1))
            .collect()
    }
}
