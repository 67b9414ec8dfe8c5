//! ISO-8601 时长（`PnDTnHnMnS`），控制面以此格式下发退避和超时配置。
//!
//! 可配合 `#[serde(with = "iso_duration")]` / `#[serde(with = "iso_duration::option")]` 使用。

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serializer};

use crate::{EventingError, Result};

pub fn parse(input: &str) -> Result<Duration> {
    let invalid = || EventingError::InvalidContract(format!("无效的ISO-8601时长: {input}"));

    let rest = input.trim().strip_prefix('P').ok_or_else(invalid)?;
    if rest.is_empty() {
        return Err(invalid());
    }

    let (date_part, time_part) = match rest.split_once('T') {
        Some((date, time)) => {
            if time.is_empty() {
                return Err(invalid());
            }
            (date, Some(time))
        }
        None => (rest, None),
    };

    let mut total_ms: f64 = 0.0;

    let mut accumulate = |part: &str, units: &[(char, f64)]| -> Result<()> {
        let mut number = String::new();
        let mut unit_index = 0;
        for c in part.chars() {
            if c.is_ascii_digit() || c == '.' {
                number.push(c);
                continue;
            }
            // 单位必须按顺序出现且各出现一次
            let position = units[unit_index..]
                .iter()
                .position(|(unit, _)| *unit == c)
                .ok_or_else(invalid)?;
            let (_, factor) = units[unit_index + position];
            let value: f64 = number.parse().map_err(|_| invalid())?;
            total_ms += value * factor;
            number.clear();
            unit_index += position + 1;
        }
        if number.is_empty() {
            Ok(())
        } else {
            Err(invalid())
        }
    };

    accumulate(date_part, &[('D', 86_400_000.0)])?;
    if let Some(time) = time_part {
        accumulate(time, &[('H', 3_600_000.0), ('M', 60_000.0), ('S', 1_000.0)])?;
    }

    if !total_ms.is_finite() || total_ms < 0.0 {
        return Err(invalid());
    }
    Ok(Duration::from_millis(total_ms.round() as u64))
}

pub fn format(duration: &Duration) -> String {
    let millis = duration.as_millis();
    let seconds = millis / 1000;
    let fraction = millis % 1000;
    if fraction == 0 {
        format!("PT{seconds}S")
    } else {
        let fraction = format!("{fraction:03}");
        format!("PT{seconds}.{}S", fraction.trim_end_matches('0'))
    }
}

pub fn serialize<S>(duration: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format(duration))
}

pub fn deserialize<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse(&raw).map_err(serde::de::Error::custom)
}

pub mod option {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(
        duration: &Option<Duration>,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(duration) => serializer.serialize_some(&super::format(duration)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> std::result::Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        raw.map(|raw| super::parse(&raw).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_durations() {
        assert_eq!(parse("PT0.2S").unwrap(), Duration::from_millis(200));
        assert_eq!(parse("PT1S").unwrap(), Duration::from_secs(1));
        assert_eq!(parse("PT1M30S").unwrap(), Duration::from_secs(90));
        assert_eq!(parse("PT2H").unwrap(), Duration::from_secs(7200));
        assert_eq!(parse("P1DT1S").unwrap(), Duration::from_secs(86_401));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for input in ["", "P", "PT", "1S", "PT1", "PTS", "PT1S1M", "PT1X", "PT1.2.3S"] {
            assert!(parse(input).is_err(), "{input} 应该被拒绝");
        }
    }

    #[test]
    fn test_format() {
        assert_eq!(format(&Duration::from_millis(200)), "PT0.2S");
        assert_eq!(format(&Duration::from_millis(1250)), "PT1.25S");
        assert_eq!(format(&Duration::from_secs(5)), "PT5S");
        assert_eq!(parse(&format(&Duration::from_millis(1001))).unwrap(), Duration::from_millis(1001));
    }
}
