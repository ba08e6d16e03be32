// Feetech STS3215 serial protocol
//
// Packet format: [0xFF, 0xFF, ID, Length, Instruction, Params..., Checksum]
// Status format: [0xFF, 0xFF, ID, Length, Error, Params..., Checksum]
// Length counts everything after itself, checksum included.

use std::io::{Read, Write};
use std::time::Duration;

use serialport::SerialPort;
use tracing::debug;

pub const DEFAULT_TIMEOUT_MS: u64 = 100;

/// Broadcast ID, used by sync write. Motors never answer it.
pub const BROADCAST_ID: u8 = 0xFE;

const HEADER: [u8; 2] = [0xFF, 0xFF];

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    Ping = 0x01,
    Read = 0x02,
    Write = 0x03,
    SyncWrite = 0x83,
}

/// RAM register addresses used by the base
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Register {
    OperatingMode = 33,   // 1 byte: 0=position, 1=velocity, 2=PWM, 3=step
    TorqueEnable = 40,    // 1 byte
    GoalVelocity = 46,    // 2 bytes, sign-magnitude
    Lock = 55,            // 1 byte
    PresentVelocity = 58, // 2 bytes, sign-magnitude, read-only
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatingMode {
    Position = 0,
    Velocity = 1,
}

#[derive(Debug, thiserror::Error)]
pub enum FeetechError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid response from motor {id}: {reason}")]
    InvalidResponse { id: u8, reason: String },

    #[error("Checksum mismatch for motor {id}")]
    ChecksumMismatch { id: u8 },

    #[error("Motor {id} returned error status: 0x{status:02X}")]
    MotorError { id: u8, status: u8 },

    #[error("Timeout waiting for response from motor {id}")]
    Timeout { id: u8 },
}

pub type Result<T> = std::result::Result<T, FeetechError>;

/// Inverted low byte of the sum of `data`
pub fn checksum(data: &[u8]) -> u8 {
    let sum: u32 = data.iter().map(|&b| b as u32).sum();
    !(sum as u8)
}

pub fn encode_packet(id: u8, instruction: Instruction, params: &[u8]) -> Vec<u8> {
    let mut packet = Vec::with_capacity(6 + params.len());
    packet.extend_from_slice(&HEADER);
    packet.push(id);
    packet.push((params.len() + 2) as u8);
    packet.push(instruction as u8);
    packet.extend_from_slice(params);
    packet.push(checksum(&packet[2..]));
    packet
}

/// Validate the status body read after the header.
///
/// `body` is everything following the length byte: error, params, checksum.
/// Returns the params.
pub fn decode_status(expected_id: u8, id: u8, body: &[u8]) -> Result<Vec<u8>> {
    if id != expected_id {
        return Err(FeetechError::InvalidResponse {
            id: expected_id,
            reason: format!("ID mismatch: expected {expected_id}, got {id}"),
        });
    }
    if body.len() < 2 {
        return Err(FeetechError::InvalidResponse {
            id,
            reason: format!("status too short: {} bytes", body.len()),
        });
    }

    let (payload, received) = body.split_at(body.len() - 1);
    let mut summed = vec![id, body.len() as u8];
    summed.extend_from_slice(payload);
    if checksum(&summed) != received[0] {
        return Err(FeetechError::ChecksumMismatch { id });
    }

    let status = payload[0];
    if status != 0 {
        return Err(FeetechError::MotorError { id, status });
    }
    Ok(payload[1..].to_vec())
}

/// Bit 15 = sign (1 = negative), bits 0-14 = magnitude
pub fn encode_sign_magnitude(value: i16) -> u16 {
    let magnitude = value.unsigned_abs().min(0x7FFF);
    if value < 0 { 0x8000 | magnitude } else { magnitude }
}

pub fn decode_sign_magnitude(raw: u16) -> i16 {
    let magnitude = (raw & 0x7FFF) as i16;
    if raw & 0x8000 != 0 { -magnitude } else { magnitude }
}

/// Half-duplex motor bus over any byte stream, a serial port in production
pub struct FeetechBus<P = Box<dyn SerialPort>> {
    port: P,
}

impl FeetechBus {
    pub fn open(port_name: &str, baudrate: u32) -> Result<Self> {
        debug!("Opening Feetech bus on {} at {} baud", port_name, baudrate);
        let port = serialport::new(port_name, baudrate)
            .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
            .open()?;
        Ok(Self::new(port))
    }
}

impl<P: Read + Write> FeetechBus<P> {
    pub fn new(port: P) -> Self {
        Self { port }
    }

    fn send(&mut self, id: u8, instruction: Instruction, params: &[u8]) -> Result<()> {
        let packet = encode_packet(id, instruction, params);
        self.port.write_all(&packet)?;
        self.port.flush()?;
        Ok(())
    }

    fn read_status(&mut self, expected_id: u8) -> Result<Vec<u8>> {
        let mut head = [0u8; 4];
        self.port.read_exact(&mut head).map_err(|e| match e.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::UnexpectedEof => {
                FeetechError::Timeout { id: expected_id }
            }
            _ => FeetechError::Io(e),
        })?;

        if head[..2] != HEADER {
            return Err(FeetechError::InvalidResponse {
                id: expected_id,
                reason: format!("Invalid header: {:02X?}", &head[..2]),
            });
        }

        let mut body = vec![0u8; head[3] as usize];
        self.port.read_exact(&mut body)?;
        decode_status(expected_id, head[2], &body)
    }

    /// `Ok(false)` when the motor does not answer in time
    pub fn ping(&mut self, id: u8) -> Result<bool> {
        self.send(id, Instruction::Ping, &[])?;
        match self.read_status(id) {
            Ok(_) => Ok(true),
            Err(FeetechError::Timeout { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn write_u8(&mut self, id: u8, register: Register, value: u8) -> Result<()> {
        debug!("Write u8 to motor {}: reg={:?}, value={}", id, register, value);
        self.send(id, Instruction::Write, &[register as u8, value])?;
        self.read_status(id).map(|_| ())
    }

    pub fn read_u16(&mut self, id: u8, register: Register) -> Result<u16> {
        self.send(id, Instruction::Read, &[register as u8, 2])?;
        match self.read_status(id)?.as_slice() {
            [lo, hi, ..] => Ok(u16::from_le_bytes([*lo, *hi])),
            other => Err(FeetechError::InvalidResponse {
                id,
                reason: format!("Expected 2 bytes, got {}", other.len()),
            }),
        }
    }

    /// Write one signed 16-bit register on several motors in a single broadcast
    pub fn sync_write_i16(&mut self, register: Register, data: &[(u8, i16)]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        let mut params = Vec::with_capacity(2 + 3 * data.len());
        params.push(register as u8);
        params.push(2);
        for &(id, value) in data {
            params.push(id);
            params.extend_from_slice(&encode_sign_magnitude(value).to_le_bytes());
        }
        debug!("Sync write to {} motors: reg={:?}", data.len(), register);
        self.send(BROADCAST_ID, Instruction::SyncWrite, &params)
    }

    pub fn set_torque(&mut self, id: u8, enabled: bool) -> Result<()> {
        self.write_u8(id, Register::TorqueEnable, enabled as u8)?;
        self.write_u8(id, Register::Lock, enabled as u8)
    }

    /// Torque must be disabled first
    pub fn set_operating_mode(&mut self, id: u8, mode: OperatingMode) -> Result<()> {
        self.write_u8(id, Register::OperatingMode, mode as u8)
    }

    pub fn present_velocity(&mut self, id: u8) -> Result<i16> {
        let raw = self.read_u16(id, Register::PresentVelocity)?;
        Ok(decode_sign_magnitude(raw))
    }
}


#[cfg(test)]
mod tests {
    use super::mock::MockPort;
    use super::*;

    #[test]
    fn test_checksum() {
        // ~(1+4+3+30+0+2) = ~40 = 215
        assert_eq!(checksum(&[1, 4, 0x03, 30, 0, 2]), 215);
    }

    #[test]
    fn test_checksum_wraps() {
        assert_eq!(checksum(&[0xFF, 0xFF, 0x02]), !0x00);
    }

    #[test]
    fn test_encode_ping() {
        let packet = encode_packet(1, Instruction::Ping, &[]);
        assert_eq!(packet, vec![0xFF, 0xFF, 1, 2, 0x01, !(1u8 + 2 + 1)]);
    }

    #[test]
    fn test_sign_magnitude() {
        assert_eq!(encode_sign_magnitude(100), 100);
        assert_eq!(encode_sign_magnitude(-100), 0x8064);
        assert_eq!(encode_sign_magnitude(i16::MIN), 0xFFFF);
        assert_eq!(decode_sign_magnitude(0x8064), -100);
        assert_eq!(decode_sign_magnitude(0x8001), -1);
        assert_eq!(decode_sign_magnitude(42), 42);
    }

    #[test]
    fn test_decode_status() {
        let body = [0, 0x34, 0x12];
        let mut full = vec![5, 4];
        full.extend_from_slice(&body);
        let mut with_sum = body.to_vec();
        with_sum.push(checksum(&full));
        assert_eq!(decode_status(5, 5, &with_sum).unwrap(), vec![0x34, 0x12]);
    }

    #[test]
    fn test_decode_status_errors() {
        assert!(matches!(
            decode_status(5, 6, &[0, 0]),
            Err(FeetechError::InvalidResponse { .. })
        ));
        assert!(matches!(
            decode_status(5, 5, &[0]),
            Err(FeetechError::InvalidResponse { .. })
        ));
        assert!(matches!(
            decode_status(5, 5, &[0, 0x00]),
            Err(FeetechError::ChecksumMismatch { id: 5 })
        ));
        let status_sum = checksum(&[5, 2, 0x20]);
        assert!(matches!(
            decode_status(5, 5, &[0x20, status_sum]),
            Err(FeetechError::MotorError { id: 5, status: 0x20 })
        ));
    }

    #[test]
    fn test_ping_and_timeout() {
        let mut bus = FeetechBus::new(MockPort::with_motors(&[7]));
        assert!(bus.ping(7).unwrap());
        assert!(!bus.ping(8).unwrap());
    }

    #[test]
    fn test_read_present_velocity() {
        let port = MockPort::with_motors(&[9]);
        port.state
            .lock()
            .unwrap()
            .set_u16(9, Register::PresentVelocity, encode_sign_magnitude(-321));
        let mut bus = FeetechBus::new(port);
        assert_eq!(bus.present_velocity(9).unwrap(), -321);
    }

    #[test]
    fn test_sync_write_layout() {
        let port = MockPort::with_motors(&[7, 8]);
        let mut bus = FeetechBus::new(port.clone());
        bus.sync_write_i16(Register::GoalVelocity, &[(7, 100), (8, -100)])
            .unwrap();

        let state = port.state.lock().unwrap();
        let packet = &state.written[0];
        assert_eq!(packet[2], BROADCAST_ID);
        assert_eq!(packet[4], Instruction::SyncWrite as u8);
        assert_eq!(
            &packet[5..packet.len() - 1],
            &[46, 2, 7, 100, 0, 8, 0x64, 0x80]
        );
    }
}
