use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use serde::{Deserialize, Serialize};

use crate::error::{OrmError, Result};

/// Type codes for column declarations and parameter binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    Invalid,
    Int,
    LongInt,
    Str,
    Decimal,
    DateTime,
    Float,
    Blob,
}

impl ValueType {
    pub fn name(self) -> &'static str {
        match self {
            ValueType::Invalid => "Invalid",
            ValueType::Int => "Integer",
            ValueType::LongInt => "LongInt",
            ValueType::Str => "String",
            ValueType::Decimal => "Decimal",
            ValueType::DateTime => "DateTime",
            ValueType::Float => "Float",
            ValueType::Blob => "Blob",
        }
    }
}

/// Scalar SQL value.
///
/// A closed sum with an explicit discriminator; every coercion is an
/// exhaustive match. Nulls carry no type of their own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    Null,
    Int(i32),
    LongInt(i64),
    Float(f64),
    Str(String),
    Decimal(Decimal),
    DateTime(NaiveDateTime),
    Blob(Vec<u8>),
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Null => ValueType::Invalid,
            Value::Int(_) => ValueType::Int,
            Value::LongInt(_) => ValueType::LongInt,
            Value::Float(_) => ValueType::Float,
            Value::Str(_) => ValueType::Str,
            Value::Decimal(_) => ValueType::Decimal,
            Value::DateTime(_) => ValueType::DateTime,
            Value::Blob(_) => ValueType::Blob,
        }
    }

    /// Null substitution.
    pub fn nvl(self, default: Value) -> Value {
        if self.is_null() { default } else { self }
    }

    pub fn as_int(&self) -> Result<i32> {
        match self {
            Value::Int(x) => Ok(*x),
            Value::LongInt(x) => i32::try_from(*x)
                .map_err(|_| OrmError::bad_cast(format!("{}LL", x), "Integer")),
            _ => {
                let s = self.as_string()?;
                s.parse::<i32>()
                    .map_err(|_| OrmError::bad_cast(s, "Integer"))
            }
        }
    }

    pub fn as_long_int(&self) -> Result<i64> {
        match self {
            Value::Int(x) => Ok(i64::from(*x)),
            Value::LongInt(x) => Ok(*x),
            _ => {
                let s = self.as_string()?;
                s.parse::<i64>()
                    .map_err(|_| OrmError::bad_cast(s, "LongInt"))
            }
        }
    }

    pub fn as_float(&self) -> Result<f64> {
        match self {
            Value::Float(x) => Ok(*x),
            _ => {
                let s = self.as_string()?;
                s.parse::<f64>().map_err(|_| OrmError::bad_cast(s, "Float"))
            }
        }
    }

    pub fn as_decimal(&self) -> Result<Decimal> {
        match self {
            Value::Decimal(x) => Ok(*x),
            Value::Int(x) => Ok(Decimal::from(*x)),
            Value::LongInt(x) => Ok(Decimal::from(*x)),
            Value::Float(x) => {
                Decimal::from_f64(*x).ok_or_else(|| OrmError::DecimalRange(x.to_string()))
            }
            _ => {
                let s = self.as_string()?;
                Decimal::from_str(s.trim()).map_err(|_| OrmError::bad_cast(s, "Decimal"))
            }
        }
    }

    pub fn as_date_time(&self) -> Result<NaiveDateTime> {
        match self {
            Value::DateTime(x) => Ok(*x),
            _ => {
                let s = self.as_string()?;
                if s == "sysdate" {
                    return Ok(chrono::Local::now().naive_local());
                }
                for fmt in [
                    "%Y-%m-%dT%H:%M:%S%.f",
                    "%Y-%m-%d %H:%M:%S%.f",
                    "%Y-%m-%dT%H:%M:%S",
                    "%Y-%m-%d %H:%M:%S",
                ] {
                    if let Ok(dt) = NaiveDateTime::parse_from_str(&s, fmt) {
                        return Ok(dt);
                    }
                }
                // numeric input is taken as a unix timestamp
                if let Ok(t) = s.parse::<i64>() {
                    if let Some(dt) = chrono::DateTime::from_timestamp(t, 0) {
                        return Ok(dt.naive_utc());
                    }
                }
                Err(OrmError::bad_cast(s, "DateTime"))
            }
        }
    }

    pub fn as_blob(&self) -> Result<Vec<u8>> {
        match self {
            Value::Blob(x) => Ok(x.clone()),
            _ => Ok(self.as_string()?.into_bytes()),
        }
    }

    /// String image of the value; a null has none.
    pub fn as_string(&self) -> Result<String> {
        match self {
            Value::Null => Err(OrmError::ValueIsNull),
            Value::Int(x) => Ok(x.to_string()),
            Value::LongInt(x) => Ok(x.to_string()),
            Value::Float(x) => Ok(x.to_string()),
            Value::Str(s) => Ok(s.clone()),
            Value::Decimal(d) => Ok(d.to_string()),
            Value::DateTime(dt) => Ok(format_date_time(dt, 'T')),
            Value::Blob(b) => Ok(String::from_utf8_lossy(b).into_owned()),
        }
    }

    /// Render as a dialect-neutral SQL literal. Strings are single-quoted
    /// with `''` escaping; datetimes use a space separator.
    pub fn sql_str(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Str(s) => quote_sql_string(s),
            Value::Blob(b) => quote_sql_string(&String::from_utf8_lossy(b)),
            Value::DateTime(dt) => format!("'{}'", format_date_time(dt, ' ')),
            other => other
                .as_string()
                .expect("non-null values always have a string image"),
        }
    }

    /// Coerce in place to the given type code. A null stays null under any
    /// target type; impossible conversions report `ValueBadCast`.
    pub fn fix_type(&mut self, t: ValueType) -> Result<()> {
        if self.is_null() || self.value_type() == t {
            return Ok(());
        }
        let fixed = match t {
            ValueType::Invalid => Value::Null,
            ValueType::Int => Value::Int(self.as_int()?),
            ValueType::LongInt => Value::LongInt(self.as_long_int()?),
            ValueType::Str => Value::Str(self.as_string()?),
            ValueType::Decimal => Value::Decimal(self.as_decimal()?),
            ValueType::DateTime => Value::DateTime(self.as_date_time()?),
            ValueType::Float => Value::Float(self.as_float()?),
            ValueType::Blob => Value::Blob(self.as_blob()?),
        };
        *self = fixed;
        Ok(())
    }

    pub fn swap(&mut self, other: &mut Value) {
        std::mem::swap(self, other);
    }

    /// Total ordering: nulls below everything, natural order within a
    /// type, numeric promotion across numeric types, string images
    /// otherwise.
    pub fn cmp_value(&self, other: &Value) -> Ordering {
        use Value::*;
        match (self, other) {
            (Null, Null) => Ordering::Equal,
            (Null, _) => Ordering::Less,
            (_, Null) => Ordering::Greater,

            (Int(a), Int(b)) => a.cmp(b),
            (LongInt(a), LongInt(b)) => a.cmp(b),
            (Int(a), LongInt(b)) => i64::from(*a).cmp(b),
            (LongInt(a), Int(b)) => a.cmp(&i64::from(*b)),

            (Float(a), Float(b)) => a.total_cmp(b),
            (Int(a), Float(b)) => f64::from(*a).total_cmp(b),
            (Float(a), Int(b)) => a.total_cmp(&f64::from(*b)),
            (LongInt(a), Float(b)) => (*a as f64).total_cmp(b),
            (Float(a), LongInt(b)) => a.total_cmp(&(*b as f64)),

            (Decimal(a), Decimal(b)) => a.cmp(b),
            (Int(a), Decimal(b)) => rust_decimal::Decimal::from(*a).cmp(b),
            (Decimal(a), Int(b)) => a.cmp(&rust_decimal::Decimal::from(*b)),
            (LongInt(a), Decimal(b)) => rust_decimal::Decimal::from(*a).cmp(b),
            (Decimal(a), LongInt(b)) => a.cmp(&rust_decimal::Decimal::from(*b)),
            (Float(a), Decimal(b)) => a.total_cmp(&b.to_f64().unwrap_or(f64::NAN)),
            (Decimal(a), Float(b)) => a.to_f64().unwrap_or(f64::NAN).total_cmp(b),

            (Str(a), Str(b)) => a.cmp(b),
            (DateTime(a), DateTime(b)) => a.cmp(b),
            (Blob(a), Blob(b)) => a.cmp(b),

            (a, b) => {
                let sa = a.as_string().unwrap_or_default();
                let sb = b.as_string().unwrap_or_default();
                sa.cmp(&sb)
            }
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp_value(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp_value(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cmp_value(other)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sql_str())
    }
}

impl From<i32> for Value {
    fn from(x: i32) -> Self {
        Value::Int(x)
    }
}

impl From<i64> for Value {
    fn from(x: i64) -> Self {
        Value::LongInt(x)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(x: &str) -> Self {
        Value::Str(x.to_string())
    }
}

impl From<String> for Value {
    fn from(x: String) -> Self {
        Value::Str(x)
    }
}

impl From<Decimal> for Value {
    fn from(x: Decimal) -> Self {
        Value::Decimal(x)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(x: NaiveDateTime) -> Self {
        Value::DateTime(x)
    }
}

fn quote_sql_string(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

fn format_date_time(dt: &NaiveDateTime, sep: char) -> String {
    use chrono::Timelike;
    let fmt = if dt.nanosecond() == 0 {
        format!("%Y-%m-%d{}%H:%M:%S", sep)
    } else {
        format!("%Y-%m-%d{}%H:%M:%S%.3f", sep)
    };
    dt.format(&fmt).to_string()
}

/// A fetched row: (upper-cased column name, value) pairs in the statement's
/// projection order.
pub type Row = Vec<(String, Value)>;
pub type Rows = Vec<Row>;
pub type Values = Vec<Value>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn dt(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    #[test]
    fn nulls_sort_below_everything() {
        assert_eq!(Value::Null.cmp_value(&Value::Int(-100)), Ordering::Less);
        assert_eq!(Value::Str("".into()).cmp_value(&Value::Null), Ordering::Greater);
        assert_eq!(Value::Null.cmp_value(&Value::Null), Ordering::Equal);
    }

    #[test]
    fn numeric_promotion_in_ordering() {
        assert_eq!(Value::Int(7).cmp_value(&Value::LongInt(7)), Ordering::Equal);
        assert_eq!(Value::Int(7).cmp_value(&Value::Float(7.5)), Ordering::Less);
        assert_eq!(
            Value::LongInt(3).cmp_value(&Value::Decimal("2.9".parse().unwrap())),
            Ordering::Greater
        );
    }

    #[test]
    fn mixed_types_compare_as_strings() {
        assert_eq!(
            Value::Str("10".into()).cmp_value(&Value::Int(9)),
            Ordering::Less
        );
    }

    #[test]
    fn sql_str_literals() {
        assert_eq!(Value::Null.sql_str(), "NULL");
        assert_eq!(Value::Int(-5).sql_str(), "-5");
        assert_eq!(Value::Str("it's".into()).sql_str(), "'it''s'");
        assert_eq!(
            Value::DateTime(dt(2006, 11, 16, 15, 5, 10)).sql_str(),
            "'2006-11-16 15:05:10'"
        );
        assert_eq!(
            Value::Decimal("1.20".parse().unwrap()).sql_str(),
            "1.20"
        );
    }

    #[test]
    fn as_string_uses_t_separator_for_datetimes() {
        let v = Value::DateTime(dt(2006, 11, 16, 15, 5, 10));
        assert_eq!(v.as_string().unwrap(), "2006-11-16T15:05:10");
    }

    #[test]
    fn fix_type_coerces_and_reports_bad_casts() {
        let mut v = Value::Str("42".into());
        v.fix_type(ValueType::LongInt).unwrap();
        assert_eq!(v, Value::LongInt(42));

        let mut v = Value::Str("1.2".into());
        v.fix_type(ValueType::Decimal).unwrap();
        assert_eq!(v, Value::Decimal("1.2".parse().unwrap()));

        let mut v = Value::Str("not a number".into());
        assert!(matches!(
            v.fix_type(ValueType::Int),
            Err(OrmError::ValueBadCast { .. })
        ));
    }

    #[test]
    fn fix_type_keeps_nulls_null() {
        let mut v = Value::Null;
        v.fix_type(ValueType::Int).unwrap();
        assert!(v.is_null());
    }

    #[test]
    fn int_range_is_checked() {
        assert!(matches!(
            Value::LongInt(1 << 40).as_int(),
            Err(OrmError::ValueBadCast { .. })
        ));
        assert_eq!(Value::LongInt(12).as_int().unwrap(), 12);
    }

    #[test]
    fn null_accessors_report_value_is_null() {
        assert!(matches!(Value::Null.as_string(), Err(OrmError::ValueIsNull)));
        assert!(matches!(Value::Null.as_long_int(), Err(OrmError::ValueIsNull)));
    }

    #[test]
    fn datetime_parses_both_separators() {
        let expect = dt(2010, 1, 2, 3, 4, 5);
        assert_eq!(
            Value::Str("2010-01-02T03:04:05".into()).as_date_time().unwrap(),
            expect
        );
        assert_eq!(
            Value::Str("2010-01-02 03:04:05".into()).as_date_time().unwrap(),
            expect
        );
    }

    #[test]
    fn nvl_substitutes_nulls_only() {
        assert_eq!(Value::Null.nvl(Value::Int(1)), Value::Int(1));
        assert_eq!(Value::Int(2).nvl(Value::Int(1)), Value::Int(2));
    }
}
