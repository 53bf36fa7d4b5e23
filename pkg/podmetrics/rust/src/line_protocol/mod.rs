// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

//! InfluxDB line protocol points and an asynchronous batching sender.
//!
//! ```text
//! <measurement>[,<tag>=<value>...] <field>=<value>[,<field>=<value>...] [<unix nanos>]
//! ```

mod client;

pub use client::{ClientConfig, Endpoint, ErrorListener, LineProtocolClient};

use std::collections::BTreeMap;
use std::fmt::Write as _;

use chrono::{DateTime, Utc};

use crate::error::ClientError;

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    String(String),
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Integer(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Boolean(v)
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::String(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::String(v.to_string())
    }
}

/// One line-protocol point. Tags and fields are kept sorted by key.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    measurement: String,
    tags: BTreeMap<String, String>,
    fields: BTreeMap<String, FieldValue>,
    timestamp: Option<DateTime<Utc>>,
}

impl Point {
    pub fn new(measurement: impl Into<String>) -> Self {
        Self {
            measurement: measurement.into(),
            tags: BTreeMap::new(),
            fields: BTreeMap::new(),
            timestamp: None,
        }
    }

    pub fn measurement(&self) -> &str {
        &self.measurement
    }

    pub fn add_tag(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn add_field(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> &mut Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn set_time(&mut self, timestamp: DateTime<Utc>) -> &mut Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    pub fn field(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    /// Appends this point, newline terminated, to `out`.
    ///
    /// Tags with an empty key or value are not representable and are skipped.
    pub fn encode(&self, out: &mut String) -> Result<(), ClientError> {
        if self.fields.is_empty() {
            return Err(ClientError::NoFields {
                measurement: self.measurement.clone(),
            });
        }

        escape_into(out, &self.measurement, &[',', ' ']);
        for (key, value) in &self.tags {
            if key.is_empty() || value.is_empty() {
                continue;
            }
            out.push(',');
            escape_into(out, key, &[',', '=', ' ']);
            out.push('=');
            escape_into(out, value, &[',', '=', ' ']);
        }

        for (i, (key, value)) in self.fields.iter().enumerate() {
            out.push(if i == 0 { ' ' } else { ',' });
            escape_into(out, key, &[',', '=', ' ']);
            out.push('=');
            match value {
                FieldValue::Integer(v) => {
                    let _ = write!(out, "{v}i");
                }
                FieldValue::Float(v) => {
                    let _ = write!(out, "{v:?}");
                }
                FieldValue::Boolean(v) => {
                    let _ = write!(out, "{v}");
                }
                FieldValue::String(v) => {
                    out.push('"');
                    escape_into(out, v, &['"', '\\']);
                    out.push('"');
                }
            }
        }

        if let Some(nanos) = self.timestamp.and_then(|ts| ts.timestamp_nanos_opt()) {
            let _ = write!(out, " {nanos}");
        }
        out.push('\n');
        Ok(())
    }
}

fn escape_into(out: &mut String, value: &str, special: &[char]) {
    for c in value.chars() {
        match c {
            '\n' => out.push_str("\\n"),
            c if special.contains(&c) => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn encoded(point: &Point) -> String {
        let mut out = String::new();
        point.encode(&mut out).unwrap();
        out
    }

    #[test]
    fn test_encode_sorted_tags_and_typed_fields() {
        let mut point = Point::new("cpu");
        point
            .add_tag("host", "a")
            .add_tag("dc", "east")
            .add_field("usage", 12i64)
            .add_field("load", 0.5)
            .add_field("up", true)
            .add_field("state", "ok")
            .set_time(Utc.timestamp_opt(1_700_000_000, 5).unwrap());

        assert_eq!(
            encoded(&point),
            "cpu,dc=east,host=a load=0.5,state=\"ok\",up=true,usage=12i 1700000000000000005\n"
        );
    }

    #[test]
    fn test_encode_escapes_special_characters() {
        let mut point = Point::new("my measure,x");
        point
            .add_tag("app.kubernetes.io/name", "a b=c,d")
            .add_field("msg", "say \"hi\" \\o/");

        assert_eq!(
            encoded(&point),
            "my\\ measure\\,x,app.kubernetes.io/name=a\\ b\\=c\\,d msg=\"say \\\"hi\\\" \\\\o/\"\n"
        );
    }

    #[test]
    fn test_float_fields_keep_decimal_point() {
        let mut point = Point::new("m");
        point.add_field("v", 2.0);
        assert_eq!(encoded(&point), "m v=2.0\n");
    }

    #[test]
    fn test_empty_tag_values_are_skipped() {
        let mut point = Point::new("m");
        point.add_tag("empty", "").add_tag("k", "v").add_field("f", 1i64);
        assert_eq!(encoded(&point), "m,k=v f=1i\n");
    }

    #[test]
    fn test_point_without_fields_is_rejected() {
        let mut out = String::new();
        let err = Point::new("m").encode(&mut out).unwrap_err();
        assert!(matches!(err, ClientError::NoFields { .. }));
        assert!(out.is_empty());
    }
}
