//! Decoder for pickled index sequences holding Python `datetime.datetime`
//! and `datetime.date` objects, which `serde_pickle` cannot resolve.
//!
//! Only the opcodes emitted by `pickle.dumps` for a list or tuple of dates,
//! strings and integers (protocols 2 to 5) are understood.

use crate::error::{InstallError, Result};
use crate::models::Timestamp;
use chrono::NaiveDate;
use std::collections::HashMap;

const PROTO: u8 = 0x80;
const FRAME: u8 = 0x95;
const STOP: u8 = b'.';
const MARK: u8 = b'(';
const EMPTY_LIST: u8 = b']';
const EMPTY_TUPLE: u8 = b')';
const LIST: u8 = b'l';
const TUPLE: u8 = b't';
const TUPLE1: u8 = 0x85;
const TUPLE2: u8 = 0x86;
const TUPLE3: u8 = 0x87;
const APPEND: u8 = b'a';
const APPENDS: u8 = b'e';
const MEMOIZE: u8 = 0x94;
const PUT: u8 = b'p';
const BINPUT: u8 = b'q';
const LONG_BINPUT: u8 = b'r';
const GET: u8 = b'g';
const BINGET: u8 = b'h';
const LONG_BINGET: u8 = b'j';
const GLOBAL: u8 = b'c';
const STACK_GLOBAL: u8 = 0x93;
const REDUCE: u8 = b'R';
const NONE: u8 = b'N';
const BININT: u8 = b'J';
const BININT1: u8 = b'K';
const BININT2: u8 = b'M';
const LONG1: u8 = 0x8a;
const BINFLOAT: u8 = b'G';
const SHORT_BINUNICODE: u8 = 0x8c;
const BINUNICODE: u8 = b'X';
const BINUNICODE8: u8 = 0x8d;
const SHORT_BINBYTES: u8 = b'C';
const BINBYTES: u8 = b'B';
const BINBYTES8: u8 = 0x8e;

#[derive(Debug, Clone)]
enum Item {
    None,
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    Tuple(Vec<Item>),
    List(Vec<Item>),
    Global(String, String),
    Date(Timestamp),
}

fn invalid(message: impl Into<String>) -> InstallError {
    InstallError::IndexDecode(message.into())
}

struct Machine<'b> {
    input: &'b [u8],
    pos: usize,
    stack: Vec<Item>,
    marks: Vec<usize>,
    memo: HashMap<u64, Item>,
}

impl<'b> Machine<'b> {
    fn new(input: &'b [u8]) -> Self {
        Self {
            input,
            pos: 0,
            stack: Vec::new(),
            marks: Vec::new(),
            memo: HashMap::new(),
        }
    }

    fn take(&mut self, n: usize) -> Result<&'b [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.input.len())
            .ok_or_else(|| invalid("truncated pickle stream"))?;
        let bytes = &self.input[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn byte(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u32_le(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(buf))
    }

    fn u64_le(&mut self) -> Result<u64> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(buf))
    }

    fn line(&mut self) -> Result<String> {
        let rest = &self.input[self.pos..];
        let len = rest
            .iter()
            .position(|b| *b == b'\n')
            .ok_or_else(|| invalid("unterminated text argument"))?;
        let text = String::from_utf8_lossy(self.take(len)?).into_owned();
        self.pos += 1;
        Ok(text)
    }

    fn sized(&mut self, len: u64) -> Result<&'b [u8]> {
        let len = usize::try_from(len).map_err(|_| invalid("oversized argument"))?;
        self.take(len)
    }

    fn text(&mut self, len: u64) -> Result<Item> {
        let bytes = self.sized(len)?;
        let text = std::str::from_utf8(bytes).map_err(|e| invalid(e.to_string()))?;
        Ok(Item::Str(text.to_string()))
    }

    fn pop(&mut self) -> Result<Item> {
        self.stack.pop().ok_or_else(|| invalid("stack underflow"))
    }

    fn pop_mark(&mut self) -> Result<Vec<Item>> {
        let mark = self.marks.pop().ok_or_else(|| invalid("missing mark"))?;
        if mark > self.stack.len() {
            return Err(invalid("mark beyond stack"));
        }
        Ok(self.stack.split_off(mark))
    }

    fn memo_get(&self, key: u64) -> Result<Item> {
        self.memo
            .get(&key)
            .cloned()
            .ok_or_else(|| invalid(format!("memo key {} missing", key)))
    }

    fn memo_put(&mut self, key: u64) -> Result<()> {
        let top = self.stack.last().cloned().ok_or_else(|| invalid("stack underflow"))?;
        self.memo.insert(key, top);
        Ok(())
    }

    fn extend_list(&mut self, items: Vec<Item>) -> Result<()> {
        match self.stack.last_mut() {
            Some(Item::List(list)) => {
                list.extend(items);
                Ok(())
            }
            _ => Err(invalid("append target is not a list")),
        }
    }

    fn run(mut self) -> Result<Item> {
        loop {
            let opcode = self.byte()?;
            match opcode {
                PROTO => {
                    self.byte()?;
                }
                FRAME => {
                    self.u64_le()?;
                }
                STOP => return self.pop(),
                MARK => self.marks.push(self.stack.len()),
                EMPTY_LIST => self.stack.push(Item::List(Vec::new())),
                EMPTY_TUPLE => self.stack.push(Item::Tuple(Vec::new())),
                LIST => {
                    let items = self.pop_mark()?;
                    self.stack.push(Item::List(items));
                }
                TUPLE => {
                    let items = self.pop_mark()?;
                    self.stack.push(Item::Tuple(items));
                }
                TUPLE1 | TUPLE2 | TUPLE3 => {
                    let n = usize::from(opcode - TUPLE1 + 1);
                    if self.stack.len() < n {
                        return Err(invalid("stack underflow"));
                    }
                    let items = self.stack.split_off(self.stack.len() - n);
                    self.stack.push(Item::Tuple(items));
                }
                APPEND => {
                    let item = self.pop()?;
                    self.extend_list(vec![item])?;
                }
                APPENDS => {
                    let items = self.pop_mark()?;
                    self.extend_list(items)?;
                }
                MEMOIZE => {
                    let key = self.memo.len() as u64;
                    self.memo_put(key)?;
                }
                PUT => {
                    let key = self.line()?.parse().map_err(|_| invalid("bad memo key"))?;
                    self.memo_put(key)?;
                }
                BINPUT => {
                    let key = u64::from(self.byte()?);
                    self.memo_put(key)?;
                }
                LONG_BINPUT => {
                    let key = u64::from(self.u32_le()?);
                    self.memo_put(key)?;
                }
                GET => {
                    let key = self.line()?.parse().map_err(|_| invalid("bad memo key"))?;
                    let item = self.memo_get(key)?;
                    self.stack.push(item);
                }
                BINGET => {
                    let key = u64::from(self.byte()?);
                    let item = self.memo_get(key)?;
                    self.stack.push(item);
                }
                LONG_BINGET => {
                    let key = u64::from(self.u32_le()?);
                    let item = self.memo_get(key)?;
                    self.stack.push(item);
                }
                GLOBAL => {
                    let module = self.line()?;
                    let name = self.line()?;
                    self.stack.push(Item::Global(module, name));
                }
                STACK_GLOBAL => {
                    let name = self.pop()?;
                    let module = self.pop()?;
                    match (module, name) {
                        (Item::Str(module), Item::Str(name)) => {
                            self.stack.push(Item::Global(module, name))
                        }
                        _ => return Err(invalid("global name is not a string")),
                    }
                }
                REDUCE => {
                    let args = self.pop()?;
                    let callable = self.pop()?;
                    let item = reduce(callable, args)?;
                    self.stack.push(item);
                }
                NONE => self.stack.push(Item::None),
                BININT => {
                    let value = self.u32_le()? as i32;
                    self.stack.push(Item::Int(i64::from(value)));
                }
                BININT1 => {
                    let value = self.byte()?;
                    self.stack.push(Item::Int(i64::from(value)));
                }
                BININT2 => {
                    let bytes = self.take(2)?;
                    let value = u16::from_le_bytes([bytes[0], bytes[1]]);
                    self.stack.push(Item::Int(i64::from(value)));
                }
                LONG1 => {
                    let len = u64::from(self.byte()?);
                    let bytes = self.sized(len)?;
                    self.stack.push(Item::Int(long_from_le(bytes)?));
                }
                BINFLOAT => {
                    let mut buf = [0u8; 8];
                    buf.copy_from_slice(self.take(8)?);
                    self.stack.push(Item::Float(f64::from_be_bytes(buf)));
                }
                SHORT_BINUNICODE => {
                    let len = u64::from(self.byte()?);
                    let item = self.text(len)?;
                    self.stack.push(item);
                }
                BINUNICODE => {
                    let len = u64::from(self.u32_le()?);
                    let item = self.text(len)?;
                    self.stack.push(item);
                }
                BINUNICODE8 => {
                    let len = self.u64_le()?;
                    let item = self.text(len)?;
                    self.stack.push(item);
                }
                SHORT_BINBYTES => {
                    let len = u64::from(self.byte()?);
                    let bytes = self.sized(len)?;
                    self.stack.push(Item::Bytes(bytes.to_vec()));
                }
                BINBYTES => {
                    let len = u64::from(self.u32_le()?);
                    let bytes = self.sized(len)?;
                    self.stack.push(Item::Bytes(bytes.to_vec()));
                }
                BINBYTES8 => {
                    let len = self.u64_le()?;
                    let bytes = self.sized(len)?;
                    self.stack.push(Item::Bytes(bytes.to_vec()));
                }
                other => {
                    return Err(invalid(format!(
                        "unsupported opcode 0x{:02x} at offset {}",
                        other,
                        self.pos - 1
                    )))
                }
            }
        }
    }
}

fn long_from_le(bytes: &[u8]) -> Result<i64> {
    if bytes.is_empty() {
        return Ok(0);
    }
    if bytes.len() > 8 {
        return Err(invalid("integer wider than 64 bits"));
    }
    let fill = if bytes[bytes.len() - 1] & 0x80 != 0 { 0xff } else { 0x00 };
    let mut buf = [fill; 8];
    buf[..bytes.len()].copy_from_slice(bytes);
    Ok(i64::from_le_bytes(buf))
}

fn reduce(callable: Item, args: Item) -> Result<Item> {
    let Item::Global(module, name) = callable else {
        return Err(invalid("reduce target is not a global"));
    };
    let Item::Tuple(mut args) = args else {
        return Err(invalid("reduce arguments are not a tuple"));
    };

    match (module.as_str(), name.as_str()) {
        // protocol 2 spells bytes as _codecs.encode(text, 'latin1')
        ("_codecs", "encode") => match args.first() {
            Some(Item::Str(text)) => text
                .chars()
                .map(|c| u8::try_from(u32::from(c)).map_err(|_| invalid("non latin-1 byte string")))
                .collect::<Result<Vec<u8>>>()
                .map(Item::Bytes),
            _ => Err(invalid("_codecs.encode without text")),
        },
        ("datetime", "datetime") | ("datetime", "date") => {
            if args.len() != 1 {
                return Err(invalid(format!(
                    "{}.{} with timezone or field arguments is not supported",
                    module, name
                )));
            }
            match args.remove(0) {
                Item::Bytes(state) => date_from_state(&state).map(Item::Date),
                _ => Err(invalid(format!("{}.{} state is not bytes", module, name))),
            }
        }
        _ => Err(invalid(format!("unsupported global {}.{}", module, name))),
    }
}

/// `datetime` state: year (2 bytes BE), month, day, then for date-times
/// hour, minute, second and microseconds (3 bytes BE). The high bit of the
/// month byte carries `fold`.
fn date_from_state(state: &[u8]) -> Result<Timestamp> {
    if state.len() != 4 && state.len() != 10 {
        return Err(invalid(format!("datetime state of {} bytes", state.len())));
    }
    let year = i32::from(u16::from_be_bytes([state[0], state[1]]));
    let month = u32::from(state[2] & 0x7f);
    let day = u32::from(state[3]);
    let date = NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| invalid(format!("invalid date {}-{}-{}", year, month, day)))?;

    let datetime = if state.len() == 4 {
        date.and_hms_opt(0, 0, 0)
    } else {
        let micros = (u32::from(state[7]) << 16) | (u32::from(state[8]) << 8) | u32::from(state[9]);
        date.and_hms_micro_opt(
            u32::from(state[4]),
            u32::from(state[5]),
            u32::from(state[6]),
            micros,
        )
    };
    datetime
        .map(Timestamp::new)
        .ok_or_else(|| invalid("invalid time of day"))
}

fn to_timestamp(item: Item) -> Result<Timestamp> {
    match item {
        Item::Date(ts) => Ok(ts),
        Item::Str(text) => Timestamp::parse(&text),
        Item::Int(seconds) => Timestamp::from_unix_seconds(seconds),
        Item::Float(seconds) if seconds.is_finite() && seconds.fract() == 0.0 => {
            Timestamp::from_unix_seconds(seconds as i64)
        }
        other => Err(invalid(format!("unexpected index entry {:?}", other))),
    }
}

/// Decode a pickled list (or tuple) of index entries
pub fn decode_dates(bytes: &[u8]) -> Result<Vec<Timestamp>> {
    match Machine::new(bytes).run()? {
        Item::List(items) | Item::Tuple(items) => items.into_iter().map(to_timestamp).collect(),
        _ => Err(invalid("index is not a sequence")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // pickle.dumps([datetime.datetime(2021, 2, 17, h) for h in range(3)], protocol=4)
    const DATETIMES_V4: &[u8] = b"\x80\x04\x95T\x00\x00\x00\x00\x00\x00\x00]\x94(\x8c\x08datetime\x94\x8c\x08datetime\x94\x93\x94C\n\x07\xe5\x02\x11\x00\x00\x00\x00\x00\x00\x94\x85\x94R\x94h\x03C\n\x07\xe5\x02\x11\x01\x00\x00\x00\x00\x00\x94\x85\x94R\x94h\x03C\n\x07\xe5\x02\x11\x02\x00\x00\x00\x00\x00\x94\x85\x94R\x94e.";

    // same list, protocol=2
    const DATETIMES_V2: &[u8] = b"\x80\x02]q\x00(cdatetime\ndatetime\nq\x01c_codecs\nencode\nq\x02X\x0b\x00\x00\x00\x07\xc3\xa5\x02\x11\x00\x00\x00\x00\x00\x00q\x03X\x06\x00\x00\x00latin1q\x04\x86q\x05Rq\x06\x85q\x07Rq\x08h\x01h\x02X\x0b\x00\x00\x00\x07\xc3\xa5\x02\x11\x01\x00\x00\x00\x00\x00q\th\x04\x86q\nRq\x0b\x85q\x0cRq\rh\x01h\x02X\x0b\x00\x00\x00\x07\xc3\xa5\x02\x11\x02\x00\x00\x00\x00\x00q\x0eh\x04\x86q\x0fRq\x10\x85q\x11Rq\x12e.";

    // [datetime.date(2020, 5, 1), datetime.datetime(2020, 5, 1, 12, 30, 15, 250000)], protocol=4
    const MIXED_V4: &[u8] = b"\x80\x04\x95D\x00\x00\x00\x00\x00\x00\x00]\x94(\x8c\x08datetime\x94\x8c\x04date\x94\x93\x94C\x04\x07\xe4\x05\x01\x94\x85\x94R\x94h\x01\x8c\x08datetime\x94\x93\x94C\n\x07\xe4\x05\x01\x0c\x1e\x0f\x03\xd0\x90\x94\x85\x94R\x94e.";

    fn as_strings(dates: &[Timestamp]) -> Vec<String> {
        dates.iter().map(|d| d.to_string()).collect()
    }

    #[test]
    fn test_python_datetimes_protocol_4() {
        let dates = decode_dates(DATETIMES_V4).unwrap();
        assert_eq!(
            as_strings(&dates),
            vec!["2021-02-17 00:00:00", "2021-02-17 01:00:00", "2021-02-17 02:00:00"]
        );
    }

    #[test]
    fn test_python_datetimes_protocol_2() {
        assert_eq!(decode_dates(DATETIMES_V2).unwrap(), decode_dates(DATETIMES_V4).unwrap());
    }

    #[test]
    fn test_python_dates_and_microseconds() {
        let dates = decode_dates(MIXED_V4).unwrap();
        assert_eq!(dates[0].to_string(), "2020-05-01 00:00:00");
        assert_eq!(
            dates[1].datetime(),
            NaiveDate::from_ymd_opt(2020, 5, 1)
                .unwrap()
                .and_hms_micro_opt(12, 30, 15, 250_000)
                .unwrap()
        );
    }

    #[test]
    fn test_unknown_global_is_rejected() {
        // pickle.dumps([decimal.Decimal(1)], protocol=4) style: an unknown class
        let bytes = b"\x80\x04]\x94(\x8c\x07decimal\x94\x8c\x07Decimal\x94\x93\x94\x8c\x011\x94\x85\x94R\x94e.";
        assert!(matches!(
            decode_dates(bytes),
            Err(InstallError::IndexDecode(msg)) if msg.contains("decimal.Decimal")
        ));
    }

    #[test]
    fn test_truncated_stream_is_rejected() {
        assert!(decode_dates(&DATETIMES_V4[..40]).is_err());
    }
}
