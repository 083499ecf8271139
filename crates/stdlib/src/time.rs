//! `time.*` (spec.md §4.5 "Time"). Timestamps are represented as `f64` Unix seconds
//! throughout, matching the rest of the numeric-only value model (spec.md §3 "Dynamic
//! values" has no dedicated date type).

use crate::shared::{require_number, require_str, type_error};
use chrono::{DateTime, Datelike, Duration, Months, TimeZone, Timelike, Utc};
use loom_interpreter::{ExecutionContext, OpcodeRegistry, ScriptError};
use loom_opcodes::{Arity, OpcodeMeta, SlotType};
use loom_values::{Map, Var};

fn to_datetime(opcode: &str, ts: f64) -> Result<DateTime<Utc>, ScriptError> {
    let secs = ts.trunc() as i64;
    let nanos = ((ts.fract()) * 1_000_000_000.0) as u32;
    Utc.timestamp_opt(secs, nanos)
        .single()
        .ok_or_else(|| type_error(opcode, "timestamp out of range"))
}

fn op_now(_args: &[Var], _ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    let now = Utc::now();
    Ok(Var::number(now.timestamp() as f64 + now.timestamp_subsec_nanos() as f64 / 1e9))
}

fn op_format(args: &[Var], _ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    let ts = require_number("time.format", &args[0])?;
    let fmt = require_str("time.format", &args[1])?;
    let dt = to_datetime("time.format", ts)?;
    Ok(Var::str(dt.format(fmt).to_string()))
}

fn op_parse(args: &[Var], _ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    let s = require_str("time.parse", &args[0])?;
    let fmt = require_str("time.parse", &args[1])?;
    let parsed = chrono::NaiveDateTime::parse_from_str(s, fmt)
        .map_err(|e| type_error("time.parse", format!("{e}")))?;
    let dt = Utc.from_utc_datetime(&parsed);
    Ok(Var::number(dt.timestamp() as f64 + dt.timestamp_subsec_nanos() as f64 / 1e9))
}

fn op_from_timestamp(args: &[Var], _ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    let ts = require_number("time.from_timestamp", &args[0])?;
    let dt = to_datetime("time.from_timestamp", ts)?;
    let mut m = Map::new();
    m.insert("year".into(), Var::number(dt.year() as f64));
    m.insert("month".into(), Var::number(dt.month() as f64));
    m.insert("day".into(), Var::number(dt.day() as f64));
    m.insert("hour".into(), Var::number(dt.hour() as f64));
    m.insert("minute".into(), Var::number(dt.minute() as f64));
    m.insert("second".into(), Var::number(dt.second() as f64));
    Ok(Var::map(m))
}

fn field(opcode: &str, m: &Map, key: &str) -> Result<i64, ScriptError> {
    m.get(key)
        .and_then(|v| v.as_number())
        .map(|n| n as i64)
        .ok_or_else(|| type_error(opcode, format!("missing or non-numeric field {key:?}")))
}

fn op_to_timestamp(args: &[Var], _ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    let m = args[0]
        .as_map()
        .ok_or_else(|| type_error("time.to_timestamp", "expected an object"))?;
    let year = field("time.to_timestamp", m, "year")? as i32;
    let month = field("time.to_timestamp", m, "month")? as u32;
    let day = field("time.to_timestamp", m, "day")? as u32;
    let hour = m.get("hour").and_then(|v| v.as_number()).unwrap_or(0.0) as u32;
    let minute = m.get("minute").and_then(|v| v.as_number()).unwrap_or(0.0) as u32;
    let second = m.get("second").and_then(|v| v.as_number()).unwrap_or(0.0) as u32;
    let dt = Utc
        .with_ymd_and_hms(year, month, day, hour, minute, second)
        .single()
        .ok_or_else(|| type_error("time.to_timestamp", "invalid calendar date/time"))?;
    Ok(Var::number(dt.timestamp() as f64))
}

fn op_offset(args: &[Var], _ctx: &mut ExecutionContext) -> Result<Var, ScriptError> {
    let amount = require_number("time.offset", &args[0])?;
    let unit = require_str("time.offset", &args[1])?;
    let base = if args.len() > 2 {
        require_number("time.offset", &args[2])?
    } else {
        Utc::now().timestamp() as f64
    };
    let dt = to_datetime("time.offset", base)?;
    let shifted = match unit {
        "years" => {
            let n = amount.round() as i64 * 12;
            if n >= 0 {
                dt.checked_add_months(Months::new(n as u32))
            } else {
                dt.checked_sub_months(Months::new((-n) as u32))
            }
            .ok_or_else(|| type_error("time.offset", "year offset out of range"))?
        }
        "months" => {
            let n = amount.round() as i64;
            if n >= 0 {
                dt.checked_add_months(Months::new(n as u32))
            } else {
                dt.checked_sub_months(Months::new((-n) as u32))
            }
            .ok_or_else(|| type_error("time.offset", "month offset out of range"))?
        }
        "days" => dt + Duration::seconds((amount * 86_400.0) as i64),
        "hours" => dt + Duration::seconds((amount * 3_600.0) as i64),
        "minutes" => dt + Duration::seconds((amount * 60.0) as i64),
        "seconds" => dt + Duration::milliseconds((amount * 1000.0) as i64),
        other => return Err(type_error("time.offset", format!("unknown unit {other:?}"))),
    };
    Ok(Var::number(shifted.timestamp() as f64 + shifted.timestamp_subsec_nanos() as f64 / 1e9))
}

pub fn install(registry: &mut OpcodeRegistry) {
    let meta = |name: &'static str, label: &'static str, description: &'static str, arity: Arity, returns: SlotType| OpcodeMeta {
        name,
        label,
        category: "time",
        description,
        arity,
        params: &[SlotType::Any],
        returns,
        lazy: false,
    };
    registry.register(meta("time.now", "Now", "current Unix time in seconds", Arity::Exact(0), SlotType::Number), op_now);
    registry.register(meta("time.format", "Format", "format a timestamp with a strftime pattern", Arity::Exact(2), SlotType::String), op_format);
    registry.register(meta("time.parse", "Parse", "parse a timestamp from a string", Arity::Exact(2), SlotType::Number), op_parse);
    registry.register(meta("time.from_timestamp", "From timestamp", "break a timestamp into calendar fields", Arity::Exact(1), SlotType::Object), op_from_timestamp);
    registry.register(meta("time.to_timestamp", "To timestamp", "build a timestamp from calendar fields", Arity::Exact(1), SlotType::Number), op_to_timestamp);
    registry.register(meta("time.offset", "Offset", "shift a timestamp by amount/unit", Arity::Range(2, 3), SlotType::Number), op_offset);
}

#[cfg(test)]
mod tests {
    use crate::test_support::eval_json;

    #[test]
    fn offset_days_moves_forward() {
        let base = eval_json(r#"["time.now"]"#).as_number().unwrap();
        let moved = eval_json(&format!(r#"["time.offset", 1, "days", {base}]"#)).as_number().unwrap();
        assert!((moved - base - 86_400.0).abs() < 1.0);
    }

    #[test]
    fn from_timestamp_round_trips_fields() {
        let ts = eval_json(r#"["time.to_timestamp", ["obj.new", "year", 2020, "month", 1, "day", 1]]"#);
        let broken = eval_json(&format!(r#"["time.from_timestamp", {}]"#, ts.as_number().unwrap()));
        assert_eq!(broken.as_map().unwrap().get("year").unwrap().as_number(), Some(2020.0));
    }
}
