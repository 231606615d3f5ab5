//! SCTE-104 splice requests
//!
//! Splice commands arrive as `-key value` pairs and are sent as a single
//! `splice_request_data` operation inside a multiple-operation message.

use tracing::debug;

/// Default program id until overridden by `-program_id`
pub const DEFAULT_PROGRAM_ID: u16 = 0x1234;

/// Payload descriptor preceding the message in the ancillary packet
const PAYLOAD_DESCRIPTOR: u8 = 0x08;
/// Reserved opID marking a multiple-operation message
const MULTIPLE_OPERATION_ID: u16 = 0xFFFF;
/// `splice_request_data` opID
const SPLICE_REQUEST_OP: u16 = 0x0101;
const SPLICE_REQUEST_LEN: u16 = 14;
/// Fixed part of a multiple-operation message before the first operation
const MOM_HEADER_LEN: u16 = 12;

/// One splice request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SpliceEvent {
    pub insert_type: u8,
    pub event_id: u32,
    pub program_id: u16,
    pub pre_roll_time: u16,
    pub break_duration: u16,
    pub avail_num: u8,
    pub avails_expected: u8,
    pub auto_return: u8,
}

impl SpliceEvent {
    /// Multiple-operation message carrying this request
    pub fn to_message(&self, message_number: u8) -> Vec<u8> {
        let size = MOM_HEADER_LEN + 4 + SPLICE_REQUEST_LEN;
        let mut msg = Vec::with_capacity(size as usize);
        msg.extend_from_slice(&MULTIPLE_OPERATION_ID.to_be_bytes());
        msg.extend_from_slice(&size.to_be_bytes());
        msg.push(0); // protocol_version
        msg.push(0); // AS_index
        msg.push(message_number);
        msg.extend_from_slice(&0u16.to_be_bytes()); // DPI_PID_index
        msg.push(0); // SCTE35_protocol_version
        msg.push(0); // time_type: none
        msg.push(1); // num_ops

        msg.extend_from_slice(&SPLICE_REQUEST_OP.to_be_bytes());
        msg.extend_from_slice(&SPLICE_REQUEST_LEN.to_be_bytes());
        msg.push(self.insert_type);
        msg.extend_from_slice(&self.event_id.to_be_bytes());
        msg.extend_from_slice(&self.program_id.to_be_bytes());
        msg.extend_from_slice(&self.pre_roll_time.to_be_bytes());
        msg.extend_from_slice(&self.break_duration.to_be_bytes());
        msg.push(self.avail_num);
        msg.push(self.avails_expected);
        msg.push(self.auto_return);
        msg
    }

    /// Ancillary user data: payload descriptor followed by the message
    pub fn to_user_data(&self, message_number: u8) -> Vec<u8> {
        let mut udw = vec![PAYLOAD_DESCRIPTOR];
        udw.extend(self.to_message(message_number));
        udw
    }
}

/// Leading integer of a token; anything unparsable is zero
fn leading_int(token: &str) -> i64 {
    let token = token.trim_start();
    let (sign, digits) = match token.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, token.strip_prefix('+').unwrap_or(token)),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    digits[..end]
        .parse::<i64>()
        .map(|v| sign * v)
        .unwrap_or(0)
}

/// Parses splice commands, assigning event ids when none is given
#[derive(Debug)]
pub struct SpliceParser {
    last_event_id: u32,
}

impl Default for SpliceParser {
    fn default() -> Self {
        Self::new()
    }
}

impl SpliceParser {
    pub fn new() -> Self {
        Self { last_event_id: 0 }
    }

    pub fn parse(&mut self, command: &str) -> SpliceEvent {
        let mut event = SpliceEvent {
            program_id: DEFAULT_PROGRAM_ID,
            ..Default::default()
        };
        let mut explicit_id = None;

        let tokens: Vec<&str> = command.split_whitespace().collect();
        for pair in tokens.windows(2) {
            let value = leading_int(pair[1]);
            match pair[0] {
                "-insert_type" => event.insert_type = value as u8,
                "-event_id" => explicit_id = Some(value as u32),
                "-program_id" => event.program_id = value as u16,
                "-pre_roll" => event.pre_roll_time = value as u16,
                "-break_duration" => event.break_duration = value as u16,
                "-avail_num" => event.avail_num = value as u8,
                "-avails_expected" => event.avails_expected = value as u8,
                "-auto_return" => event.auto_return = value as u8,
                _ => {}
            }
        }

        event.event_id = match explicit_id {
            Some(id) => id,
            None => {
                self.last_event_id = self.last_event_id.wrapping_add(1);
                self.last_event_id
            }
        };
        debug!("Parsed splice command {:?} as {:?}", command, event);
        event
    }
}
