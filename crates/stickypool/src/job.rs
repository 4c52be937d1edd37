//! Job descriptions, result records and the response envelope.
//!
//! A [`JobDescription`] is the caller-supplied mapping of field names to
//! [`JobValue`]s. The pool only reads the well-known fields below; everything
//! else is payload for the engine and is echoed back in the
//! [`ResultRecord`].
//!
//! ## Well-known fields
//!
//! - [`NAME_FIELD`] - Task name, stamped by the gateway.
//! - [`CORRELATION_FIELD`] - Caller's correlation identifier.
//! - [`SUBMITTED_AT_FIELD`] - Submission time in seconds since the Unix epoch.

use crate::{
    SlotToken,
    error::{Error, ErrorKind, Result},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Field holding the task name.
pub const NAME_FIELD: &str = "name";

/// Field holding the caller's correlation identifier.
pub const CORRELATION_FIELD: &str = "important_id";

/// Field holding the submission timestamp (seconds since the Unix epoch).
pub const SUBMITTED_AT_FIELD: &str = "start_time";

/// A single value in a [`JobDescription`].
///
/// JSON numbers without a fractional part decode as [`JobValue::Int`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JobValue {
    Int(i64),
    Float(f64),
    Str(String),
}

impl JobValue {
    /// Returns the value as a float, widening integers.
    #[allow(clippy::cast_precision_loss)]
    pub const fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Str(_) => None,
        }
    }

    /// Returns the value as a string slice, if it is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<i64> for JobValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for JobValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for JobValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for JobValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

/// A caller-supplied job: string keys mapped to [`JobValue`]s.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobDescription(BTreeMap<String, JobValue>);

impl JobDescription {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: impl Into<JobValue>) -> Self {
        self.insert(field, value);
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<JobValue>) {
        self.0.insert(field.into(), value.into());
    }

    /// Stamps the submission time with the current wall clock.
    #[must_use]
    pub fn submitted_now(self) -> Self {
        self.with(SUBMITTED_AT_FIELD, unix_now())
    }

    /// Looks up a field.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingField`] if the field is absent.
    pub fn get(&self, field: &str) -> Result<&JobValue> {
        self.0.get(field).ok_or_else(|| Error::missing(field))
    }

    /// Looks up a string field.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingField`] if the field is absent, or
    /// [`Error::InvalidField`] if it is not a string.
    pub fn get_str(&self, field: &str) -> Result<&str> {
        self.get(field)?
            .as_str()
            .ok_or_else(|| Error::invalid(field, "string"))
    }

    /// Looks up a numeric field as a float.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingField`] if the field is absent, or
    /// [`Error::InvalidField`] if it is not a number.
    pub fn get_f64(&self, field: &str) -> Result<f64> {
        self.get(field)?
            .as_f64()
            .ok_or_else(|| Error::invalid(field, "number"))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Every field except the well-known ones.
    pub fn payload(&self) -> Self {
        Self(
            self.0
                .iter()
                .filter(|(k, _)| {
                    !matches!(
                        k.as_str(),
                        NAME_FIELD | CORRELATION_FIELD | SUBMITTED_AT_FIELD
                    )
                })
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }
}

impl<K: Into<String>, V: Into<JobValue>> FromIterator<(K, V)> for JobDescription {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Seconds since the Unix epoch, as a float.
pub fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0.0, |d| d.as_secs_f64())
}

/// Terminal status of a job.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Success,
    Error,
}

/// Error marker carried by a failed [`ResultRecord`] in place of output.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorMarker {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&Error> for ErrorMarker {
    fn from(err: &Error) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Outcome of one job, reported exactly once.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(
        rename = "your_important_id",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub correlation_id: Option<JobValue>,
    #[serde(default)]
    pub payload: JobDescription,
    /// Seconds elapsed since submission.
    pub duration: f64,
    /// Worker the job ran on; absent for jobs refused before dispatch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker: Option<SlotToken>,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorMarker>,
}

impl ResultRecord {
    fn echo(job: &JobDescription, duration: f64, worker: Option<SlotToken>) -> Self {
        Self {
            name: job
                .get(NAME_FIELD)
                .ok()
                .and_then(JobValue::as_str)
                .map(str::to_string),
            correlation_id: job.get(CORRELATION_FIELD).ok().cloned(),
            payload: job.payload(),
            duration,
            worker,
            status: JobStatus::Success,
            result: None,
            error: None,
        }
    }

    /// A successful record carrying engine output.
    pub fn success(
        job: &JobDescription,
        duration: f64,
        worker: SlotToken,
        output: serde_json::Value,
    ) -> Self {
        Self {
            result: Some(output),
            ..Self::echo(job, duration, Some(worker))
        }
    }

    /// An error-tagged record for a job that reached a worker.
    pub fn failure(job: &JobDescription, duration: f64, worker: SlotToken, err: &Error) -> Self {
        Self {
            status: JobStatus::Error,
            error: Some(err.into()),
            ..Self::echo(job, duration, Some(worker))
        }
    }

    /// An error-tagged record for a job refused before dispatch.
    ///
    /// The duration is measured from the job's submission timestamp when it
    /// has one, and is zero otherwise.
    pub fn rejected(job: &JobDescription, err: &Error) -> Self {
        let duration = job
            .get_f64(SUBMITTED_AT_FIELD)
            .map_or(0.0, |submitted| (unix_now() - submitted).max(0.0));
        Self {
            status: JobStatus::Error,
            error: Some(err.into()),
            ..Self::echo(job, duration, None)
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == JobStatus::Success
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|m| m.kind)
    }
}

/// Envelope status returned to the gateway's caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EnvelopeStatus {
    Ok,
    Error,
}

/// Response envelope wrapping a [`ResultRecord`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub status: EnvelopeStatus,
    pub result: ResultRecord,
}

impl From<ResultRecord> for Envelope {
    fn from(result: ResultRecord) -> Self {
        let status = if result.is_success() {
            EnvelopeStatus::Ok
        } else {
            EnvelopeStatus::Error
        };
        Self { status, result }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn integers_decode_as_int_and_fractions_as_float() {
        let job: JobDescription = serde_json::from_value(json!({
            "important_id": 7,
            "start_time": 1_700_000_000.25,
            "text": "hallo",
        }))
        .unwrap();

        assert_eq!(job.get(CORRELATION_FIELD).unwrap(), &JobValue::Int(7));
        assert_eq!(
            job.get(SUBMITTED_AT_FIELD).unwrap(),
            &JobValue::Float(1_700_000_000.25)
        );
        assert_eq!(job.get_str("text").unwrap(), "hallo");
    }

    #[test]
    fn accessors_report_missing_and_invalid_fields() {
        let job = JobDescription::new().with("text", 3_i64);

        assert_eq!(
            job.get("target_lang").unwrap_err(),
            Error::MissingField {
                field: "target_lang".to_string()
            }
        );
        assert_eq!(
            job.get_str("text").unwrap_err(),
            Error::InvalidField {
                field: "text".to_string(),
                expected: "string"
            }
        );
        assert_eq!(job.get_f64("text").unwrap(), 3.0);
    }

    #[test]
    fn payload_excludes_well_known_fields() {
        let job = JobDescription::new()
            .with(NAME_FIELD, "task")
            .with(CORRELATION_FIELD, 1_i64)
            .with(SUBMITTED_AT_FIELD, 0.0)
            .with("text", "hi")
            .with("target_lang", "de");

        let payload = job.payload();
        assert_eq!(payload.len(), 2);
        assert!(payload.get(NAME_FIELD).is_err());
        assert_eq!(payload.get_str("target_lang").unwrap(), "de");
    }

    #[test]
    fn success_envelope_wire_format() {
        let token = SlotToken::issue();
        let job = JobDescription::new()
            .with(NAME_FIELD, "Hotzenplot-task")
            .with(CORRELATION_FIELD, 3_i64)
            .with("text", "hi");
        let record = ResultRecord::success(&job, 1.5, token, json!("done"));

        let value = serde_json::to_value(Envelope::from(record)).unwrap();
        assert_eq!(
            value,
            json!({
                "status": "OK",
                "result": {
                    "name": "Hotzenplot-task",
                    "your_important_id": 3,
                    "payload": { "text": "hi" },
                    "duration": 1.5,
                    "worker": token.get(),
                    "status": "success",
                    "result": "done",
                }
            })
        );
    }

    #[test]
    fn failure_envelope_carries_error_marker() {
        let token = SlotToken::issue();
        let job = JobDescription::new().with(CORRELATION_FIELD, "abc");
        let err = Error::Unavailable {
            token,
            capacity: 2,
        };
        let envelope = Envelope::from(ResultRecord::failure(&job, 0.0, token, &err));

        assert_eq!(envelope.status, EnvelopeStatus::Error);
        assert_eq!(envelope.result.error_kind(), Some(ErrorKind::Capacity));
        assert!(envelope.result.result.is_none());

        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["status"], "ERROR");
        assert_eq!(value["result"]["error"]["kind"], "capacity");
    }

    #[test]
    fn rejected_record_has_no_worker() {
        let job = JobDescription::new()
            .with(CORRELATION_FIELD, 9_i64)
            .submitted_now();
        let record = ResultRecord::rejected(&job, &Error::QueueFull { depth: 4 });

        assert!(record.worker.is_none());
        assert_eq!(record.error_kind(), Some(ErrorKind::Rejected));
        assert!(record.duration >= 0.0);
    }
}
