//! Segmented transfer: split a buffer into protocol-sized frames and push
//! them one acknowledged frame at a time.

use crate::error::FlashError;
use crate::protocol::{Command, FLASH_DATA_MAX_FRAME, Packet, Response, SEG_DATA_MAX_FRAME};

/// Which data command carries the frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Loader segment data into RAM. The destination comes from the segment
    /// header, so frames carry no address.
    SegmentData,
    /// Asset data into flash, each frame addressed and checksummed.
    FlashData,
}

impl FrameKind {
    /// Largest payload of data per frame.
    pub fn ceiling(self) -> usize {
        match self {
            FrameKind::SegmentData => SEG_DATA_MAX_FRAME,
            FrameKind::FlashData => FLASH_DATA_MAX_FRAME,
        }
    }

    pub fn command(self) -> Command {
        match self {
            FrameKind::SegmentData => Command::SegData,
            FrameKind::FlashData => Command::FlashData,
        }
    }

    /// Build the request for one planned frame.
    pub fn packet(self, frame: &Frame, data: &[u8]) -> Packet {
        let chunk = &data[frame.offset..frame.offset + frame.len];
        match self {
            FrameKind::SegmentData => Packet::segment_data(chunk),
            FrameKind::FlashData => Packet::flash_data(frame.address, chunk),
        }
    }
}

/// One planned frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    pub index: usize,
    /// Offset into the source buffer.
    pub offset: usize,
    pub len: usize,
    /// Destination address, `base + offset`.
    pub address: u32,
}

/// Split `len` bytes into frames of at most `ceiling` bytes starting at
/// `base`. Frame `i` starts at offset `i * ceiling`. A zero ceiling plans
/// nothing; [`send`] refuses it.
pub fn plan_frames(len: usize, ceiling: usize, base: u32) -> Vec<Frame> {
    if ceiling == 0 {
        return Vec::new();
    }
    (0..len.div_ceil(ceiling))
        .map(|index| {
            let offset = index * ceiling;
            Frame {
                index,
                offset,
                len: ceiling.min(len - offset),
                address: base.wrapping_add(offset as u32),
            }
        })
        .collect()
}

/// Something that can send a request and wait for its response.
pub trait Exchange {
    fn exchange(&mut self, packet: &Packet) -> Result<Response, FlashError>;

    /// Called after each acknowledged frame.
    fn frame_sent(&mut self, _kind: FrameKind, _frame: &Frame, _total: usize) {}
}

/// Push `data` to `base` in frames of `kind`, at most `ceiling` bytes each
/// (clamped to the command's limit). Every frame must be acknowledged before
/// the next goes out; the first failure aborts and frames already written
/// stay written.
pub fn send<E: Exchange + ?Sized>(
    link: &mut E,
    kind: FrameKind,
    data: &[u8],
    base: u32,
    ceiling: usize,
) -> Result<usize, FlashError> {
    if ceiling == 0 {
        return Err(FlashError::Config(format!(
            "{} frame size must be non-zero",
            kind.command()
        )));
    }
    let frames = plan_frames(data.len(), ceiling.min(kind.ceiling()), base);
    for frame in &frames {
        let packet = kind.packet(frame, data);
        match link.exchange(&packet)? {
            Response::Ack => {}
            other => {
                return Err(FlashError::UnexpectedResponse {
                    command: kind.command(),
                    response: other,
                });
            }
        }
        link.frame_sent(kind, frame, data.len());
    }
    Ok(frames.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ProtocolError, Stage};

    /// Records every packet and fails on a chosen frame.
    struct Recorder {
        packets: Vec<Packet>,
        fail_at: Option<usize>,
        progress: Vec<usize>,
    }

    impl Recorder {
        fn new(fail_at: Option<usize>) -> Self {
            Self {
                packets: Vec::new(),
                fail_at,
                progress: Vec::new(),
            }
        }
    }

    impl Exchange for Recorder {
        fn exchange(&mut self, packet: &Packet) -> Result<Response, FlashError> {
            if self.fail_at == Some(self.packets.len()) {
                return Err(ProtocolError::DeviceReported {
                    command: packet.command(),
                    stage: Stage::FlashLoader,
                    code: 0x0006,
                    message: "EFLASH_LOADER_FLASH_WRITE_ERROR",
                }
                .into());
            }
            self.packets.push(packet.clone());
            Ok(Response::Ack)
        }

        fn frame_sent(&mut self, _kind: FrameKind, frame: &Frame, _total: usize) {
            self.progress.push(frame.offset + frame.len);
        }
    }

    #[test]
    fn test_plan_5000_at_2048() {
        let frames = plan_frames(5000, 2048, 0x1000);
        let lens: Vec<usize> = frames.iter().map(|f| f.len).collect();
        assert_eq!(lens, vec![2048, 2048, 904]);
        let addrs: Vec<u32> = frames.iter().map(|f| f.address).collect();
        assert_eq!(addrs, vec![0x1000, 0x1800, 0x2000]);
    }

    #[test]
    fn test_plan_covers_buffer() {
        for (len, ceiling) in [(0, 16), (1, 16), (16, 16), (17, 16), (8192, 8192), (20000, 8192)] {
            let frames = plan_frames(len, ceiling, 0);
            assert_eq!(frames.len(), len.div_ceil(ceiling));
            assert_eq!(frames.iter().map(|f| f.len).sum::<usize>(), len);
            for (i, f) in frames.iter().enumerate() {
                assert_eq!(f.offset, i * ceiling);
                assert!(f.len <= ceiling && f.len > 0);
            }
        }
    }

    #[test]
    fn test_flash_frames_reassemble() {
        let data: Vec<u8> = (0..20_000u32).map(|i| (i % 251) as u8).collect();
        let mut rec = Recorder::new(None);
        let sent = send(&mut rec, FrameKind::FlashData, &data, 0x2_0000, FLASH_DATA_MAX_FRAME).unwrap();
        assert_eq!(sent, 3);

        let mut rebuilt = Vec::new();
        for (i, p) in rec.packets.iter().enumerate() {
            assert_eq!(p.command(), Command::FlashData);
            let addr = u32::from_le_bytes(p.payload()[..4].try_into().unwrap());
            assert_eq!(addr, 0x2_0000 + (i * FLASH_DATA_MAX_FRAME) as u32);
            rebuilt.extend_from_slice(&p.payload()[4..]);
        }
        assert_eq!(rebuilt, data);
        assert_eq!(rec.progress, vec![8192, 16384, 20000]);
    }

    #[test]
    fn test_segment_frames_carry_no_address() {
        let data = vec![0xA5u8; 5000];
        let mut rec = Recorder::new(None);
        send(&mut rec, FrameKind::SegmentData, &data, 0x2201_0000, SEG_DATA_MAX_FRAME).unwrap();
        let lens: Vec<usize> = rec.packets.iter().map(|p| p.payload().len()).collect();
        assert_eq!(lens, vec![2048, 2048, 904]);
        let encoded = rec.packets[0].encode().unwrap();
        assert_eq!(encoded[0], 0x18);
        assert_eq!(encoded[1], 0);
    }

    #[test]
    fn test_ceiling_is_clamped() {
        let data = vec![0u8; 5000];
        let mut rec = Recorder::new(None);
        assert_eq!(send(&mut rec, FrameKind::SegmentData, &data, 0, 1 << 20).unwrap(), 3);

        let mut rec = Recorder::new(None);
        assert_eq!(send(&mut rec, FrameKind::FlashData, &data, 0, 2048).unwrap(), 3);
        assert_eq!(rec.packets[2].payload().len(), 4 + 904);
    }

    #[test]
    fn test_first_failure_aborts() {
        let data = vec![0u8; 3 * FLASH_DATA_MAX_FRAME];
        let mut rec = Recorder::new(Some(1));
        let err = send(&mut rec, FrameKind::FlashData, &data, 0, FLASH_DATA_MAX_FRAME).unwrap_err();
        assert_eq!(err.device_code(), Some(0x0006));
        assert_eq!(rec.packets.len(), 1);
    }

    #[test]
    fn test_zero_ceiling_is_rejected() {
        let mut rec = Recorder::new(None);
        let err = send(&mut rec, FrameKind::FlashData, &[1, 2, 3], 0, 0).unwrap_err();
        assert!(matches!(err, FlashError::Config(_)));
        assert!(rec.packets.is_empty());
        assert!(plan_frames(3, 0, 0).is_empty());
    }
}
