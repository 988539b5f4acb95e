//! Bulk-Only Transport framing and the SCSI command subset hosts use for a
//! removable flash drive.
//!
//! Everything here is transport-agnostic: the USB task parses a CBW, asks
//! [`ScsiTarget::respond`] what to do, moves the data, then sends the CSW.
//! Sector transfers are returned as [`Outcome::Read`] / [`Outcome::Write`]
//! so the transport can stream them one sector at a time.

use crate::config::{MSC_PRODUCT_ID, MSC_PRODUCT_REV, MSC_VENDOR_ID};

/// `USBC`
const CBW_SIGNATURE: u32 = 0x4342_5355;
/// `USBS`
const CSW_SIGNATURE: u32 = 0x5342_5355;

pub const CBW_SIZE: usize = 31;
pub const CSW_SIZE: usize = 13;

/// Largest fixed response built by [`ScsiTarget::respond`].
pub const RESPONSE_CAPACITY: usize = 36;

/// Command Block Wrapper.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Cbw {
    pub tag: u32,
    pub data_len: u32,
    /// Data stage runs device-to-host.
    pub data_in: bool,
    pub lun: u8,
    cdb: [u8; 16],
    cdb_len: u8,
}

impl Cbw {
    /// Parse a CBW packet. Anything that is not exactly one valid CBW is
    /// rejected.
    pub fn parse(packet: &[u8]) -> Option<Self> {
        if packet.len() != CBW_SIZE {
            return None;
        }
        let signature = u32::from_le_bytes([packet[0], packet[1], packet[2], packet[3]]);
        let cdb_len = packet[14] & 0x1F;
        if signature != CBW_SIGNATURE || cdb_len == 0 || cdb_len > 16 {
            return None;
        }

        let mut cdb = [0u8; 16];
        cdb[..cdb_len as usize].copy_from_slice(&packet[15..15 + cdb_len as usize]);
        Some(Self {
            tag: u32::from_le_bytes([packet[4], packet[5], packet[6], packet[7]]),
            data_len: u32::from_le_bytes([packet[8], packet[9], packet[10], packet[11]]),
            data_in: packet[12] & 0x80 != 0,
            lun: packet[13] & 0x0F,
            cdb,
            cdb_len,
        })
    }

    pub fn cdb(&self) -> &[u8] {
        &self.cdb[..self.cdb_len as usize]
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum CswStatus {
    Passed = 0,
    Failed = 1,
    PhaseError = 2,
}

/// Command Status Wrapper.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Csw {
    pub tag: u32,
    pub residue: u32,
    pub status: CswStatus,
}

impl Csw {
    pub fn to_bytes(&self) -> [u8; CSW_SIZE] {
        let mut out = [0u8; CSW_SIZE];
        out[0..4].copy_from_slice(&CSW_SIGNATURE.to_le_bytes());
        out[4..8].copy_from_slice(&self.tag.to_le_bytes());
        out[8..12].copy_from_slice(&self.residue.to_le_bytes());
        out[12] = self.status as u8;
        out
    }
}

/// Decoded command descriptor block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    TestUnitReady,
    RequestSense { alloc_len: u8 },
    Inquiry { alloc_len: u16 },
    ModeSense6 { alloc_len: u8 },
    StartStopUnit { start: bool, load_eject: bool },
    PreventAllowMediumRemoval { prevent: bool },
    ReadFormatCapacities { alloc_len: u16 },
    ReadCapacity10,
    Read10 { lba: u32, blocks: u16 },
    Write10 { lba: u32, blocks: u16 },
    Unsupported(u8),
}

impl Command {
    pub fn parse(cdb: &[u8]) -> Self {
        let byte = |i: usize| cdb.get(i).copied().unwrap_or(0);
        let be16 = |i: usize| u16::from_be_bytes([byte(i), byte(i + 1)]);
        let be32 = |i: usize| u32::from_be_bytes([byte(i), byte(i + 1), byte(i + 2), byte(i + 3)]);

        match byte(0) {
            0x00 => Self::TestUnitReady,
            0x03 => Self::RequestSense { alloc_len: byte(4) },
            0x12 => Self::Inquiry { alloc_len: be16(3) },
            0x1A => Self::ModeSense6 { alloc_len: byte(4) },
            0x1B => Self::StartStopUnit {
                start: byte(4) & 0x01 != 0,
                load_eject: byte(4) & 0x02 != 0,
            },
            0x1E => Self::PreventAllowMediumRemoval {
                prevent: byte(4) & 0x01 != 0,
            },
            0x23 => Self::ReadFormatCapacities { alloc_len: be16(7) },
            0x25 => Self::ReadCapacity10,
            0x28 => Self::Read10 {
                lba: be32(2),
                blocks: be16(7),
            },
            0x2A => Self::Write10 {
                lba: be32(2),
                blocks: be16(7),
            },
            op => Self::Unsupported(op),
        }
    }
}

/// Sense key with additional sense code and qualifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Sense {
    pub key: u8,
    pub asc: u8,
    pub ascq: u8,
}

impl Sense {
    pub const NONE: Self = Self::new(0x00, 0x00, 0x00);
    pub const MEDIUM_NOT_PRESENT: Self = Self::new(0x02, 0x3A, 0x00);
    pub const WRITE_FAULT: Self = Self::new(0x03, 0x03, 0x00);
    pub const READ_ERROR: Self = Self::new(0x03, 0x11, 0x00);
    pub const INVALID_OPCODE: Self = Self::new(0x05, 0x20, 0x00);
    pub const LBA_OUT_OF_RANGE: Self = Self::new(0x05, 0x21, 0x00);
    pub const MEDIUM_CHANGED: Self = Self::new(0x06, 0x28, 0x00);

    pub const fn new(key: u8, asc: u8, ascq: u8) -> Self {
        Self { key, asc, ascq }
    }
}

/// What the transport must do to complete a command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Outcome {
    /// Send the first `n` bytes of the response buffer, then pass.
    Data(usize),
    /// No data stage; pass.
    Passed,
    /// No data stage; fail. The sense data says why.
    Failed,
    /// Stream `blocks` sectors starting at `lba` to the host.
    Read { lba: u32, blocks: u16 },
    /// Receive `blocks` sectors starting at `lba` from the host.
    Write { lba: u32, blocks: u16 },
    /// The host ejected the medium; pass and report the eject.
    Ejected,
}

/// State of the single logical unit.
#[derive(Debug)]
pub struct ScsiTarget {
    block_count: u32,
    block_size: u32,
    sense: Sense,
    medium_present: bool,
    unit_attention: bool,
}

impl ScsiTarget {
    /// A unit with no medium loaded.
    pub const fn new(block_count: u32, block_size: u32) -> Self {
        Self {
            block_count,
            block_size,
            sense: Sense::NONE,
            medium_present: false,
            unit_attention: false,
        }
    }

    pub fn medium_present(&self) -> bool {
        self.medium_present
    }

    /// Load or unload the medium. Loading raises a unit attention so the
    /// host drops anything it cached.
    pub fn set_medium_present(&mut self, present: bool) {
        if present && !self.medium_present {
            self.unit_attention = true;
        }
        self.medium_present = present;
    }

    pub fn sense(&self) -> Sense {
        self.sense
    }

    /// Record a failure found while moving sector data.
    pub fn fail(&mut self, sense: Sense) {
        self.sense = sense;
    }

    /// Execute `command`, writing any fixed-size response into `out`.
    pub fn respond(&mut self, command: &Command, out: &mut [u8; RESPONSE_CAPACITY]) -> Outcome {
        match *command {
            Command::Inquiry { alloc_len } => {
                let n = self.inquiry(out);
                return Outcome::Data(n.min(alloc_len as usize));
            }
            Command::RequestSense { alloc_len } => {
                let n = self.request_sense(out);
                return Outcome::Data(n.min(alloc_len as usize));
            }
            _ => {}
        }

        if let Command::Unsupported(op) = *command {
            debug!("scsi: unsupported opcode {=u8:#x}", op);
            return self.failed(Sense::INVALID_OPCODE);
        }

        if !self.medium_present {
            if let Command::PreventAllowMediumRemoval { .. } | Command::StartStopUnit { .. } = command {
                return Outcome::Passed;
            }
            return self.failed(Sense::MEDIUM_NOT_PRESENT);
        }

        if self.unit_attention {
            self.unit_attention = false;
            return self.failed(Sense::MEDIUM_CHANGED);
        }

        self.sense = Sense::NONE;
        match *command {
            Command::TestUnitReady | Command::PreventAllowMediumRemoval { .. } => Outcome::Passed,
            Command::StartStopUnit { start, load_eject } => {
                if load_eject && !start {
                    info!("scsi: medium ejected");
                    self.medium_present = false;
                    Outcome::Ejected
                } else {
                    Outcome::Passed
                }
            }
            Command::ModeSense6 { alloc_len } => {
                // Header only: no block descriptors, not write protected.
                out[..4].copy_from_slice(&[0x03, 0x00, 0x00, 0x00]);
                Outcome::Data(4.min(alloc_len as usize))
            }
            Command::ReadCapacity10 => {
                out[..4].copy_from_slice(&(self.block_count - 1).to_be_bytes());
                out[4..8].copy_from_slice(&self.block_size.to_be_bytes());
                Outcome::Data(8)
            }
            Command::ReadFormatCapacities { alloc_len } => {
                out[..4].copy_from_slice(&[0x00, 0x00, 0x00, 0x08]);
                out[4..8].copy_from_slice(&self.block_count.to_be_bytes());
                // Descriptor type 2: formatted media.
                out[8] = 0x02;
                out[9..12].copy_from_slice(&self.block_size.to_be_bytes()[1..]);
                Outcome::Data(12.min(alloc_len as usize))
            }
            Command::Read10 { lba, blocks } => match self.check_range(lba, blocks) {
                Ok(()) => Outcome::Read { lba, blocks },
                Err(sense) => self.failed(sense),
            },
            Command::Write10 { lba, blocks } => match self.check_range(lba, blocks) {
                Ok(()) => Outcome::Write { lba, blocks },
                Err(sense) => self.failed(sense),
            },
            Command::Inquiry { .. } | Command::RequestSense { .. } | Command::Unsupported(_) => {
                Outcome::Failed
            }
        }
    }

    fn failed(&mut self, sense: Sense) -> Outcome {
        self.sense = sense;
        Outcome::Failed
    }

    fn check_range(&self, lba: u32, blocks: u16) -> Result<(), Sense> {
        match lba.checked_add(blocks as u32) {
            Some(end) if end <= self.block_count => Ok(()),
            _ => Err(Sense::LBA_OUT_OF_RANGE),
        }
    }

    fn inquiry(&self, out: &mut [u8; RESPONSE_CAPACITY]) -> usize {
        out.fill(b' ');
        // Direct-access block device, removable, SPC-2, response format 2.
        out[..8].copy_from_slice(&[0x00, 0x80, 0x04, 0x02, 31, 0x00, 0x00, 0x00]);
        copy_padded(&mut out[8..16], MSC_VENDOR_ID);
        copy_padded(&mut out[16..32], MSC_PRODUCT_ID);
        copy_padded(&mut out[32..36], MSC_PRODUCT_REV);
        36
    }

    /// Fixed-format sense data. Reporting clears the sense.
    fn request_sense(&mut self, out: &mut [u8; RESPONSE_CAPACITY]) -> usize {
        out[..18].fill(0);
        out[0] = 0x70;
        out[2] = self.sense.key;
        out[7] = 10;
        out[12] = self.sense.asc;
        out[13] = self.sense.ascq;
        self.sense = Sense::NONE;
        18
    }
}

fn copy_padded(field: &mut [u8], text: &str) {
    field.fill(b' ');
    for (slot, b) in field.iter_mut().zip(text.bytes()) {
        *slot = b;
    }
}
