use crate::engine::{EngineError, EngineHandle};
use chrono::{Local, NaiveDate};
use presence_core::ledger::parse_moment;
use presence_core::{AttendanceFilter, ErrorKind, NewPerson, PersonPatch};
use serde::Serialize;
use serde_json::{json, Value};
use zbus::interface;

/// D-Bus interface for the attendance daemon.
///
/// Bus name: org.presence.Attendance1
/// Object path: /org/presence/Attendance1
///
/// Every method returns a JSON envelope:
/// `{"success": bool, "data"?, "total"?, "message"?, "error"?}`.
pub struct AttendanceService {
    engine: EngineHandle,
    provider_url: String,
    kiosk_enabled: bool,
}

impl AttendanceService {
    pub fn new(engine: EngineHandle, provider_url: String, kiosk_enabled: bool) -> Self {
        Self {
            engine,
            provider_url,
            kiosk_enabled,
        }
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn parse_json<T: serde::de::DeserializeOwned>(what: &str, raw: &str) -> Result<T, EngineError> {
    let raw = if raw.trim().is_empty() { "{}" } else { raw };
    serde_json::from_str(raw).map_err(|e| EngineError::InvalidRequest(format!("{what}: {e}")))
}

fn success(data: impl Serialize) -> Value {
    json!({ "success": true, "data": data })
}

fn failure(op: &str, err: &EngineError) -> Value {
    let kind = err.kind();
    if kind == ErrorKind::Failure {
        tracing::error!(op, error = %err, "request failed");
    }
    json!({
        "success": false,
        "message": err.to_string(),
        "error": kind.as_str(),
    })
}

/// Envelope for a single value.
fn reply<T: Serialize>(op: &str, result: Result<T, EngineError>) -> String {
    match result {
        Ok(data) => success(data),
        Err(e) => failure(op, &e),
    }
    .to_string()
}

/// Envelope for a list, with its length in `total`.
fn reply_list<T: Serialize>(op: &str, result: Result<Vec<T>, EngineError>) -> String {
    match result {
        Ok(items) => json!({ "success": true, "total": items.len(), "data": items }),
        Err(e) => failure(op, &e),
    }
    .to_string()
}

/// Envelope for an action whose only output is a message.
fn reply_message(op: &str, result: Result<String, EngineError>) -> String {
    match result {
        Ok(message) => json!({ "success": true, "message": message }),
        Err(e) => failure(op, &e),
    }
    .to_string()
}

#[interface(name = "org.presence.Attendance1")]
impl AttendanceService {
    async fn list_persons(&self) -> String {
        let result = self.engine.with_store(|s| Ok(s.persons().to_vec())).await;
        reply_list("list_persons", result)
    }

    async fn get_person(&self, id: String) -> String {
        let result = self.engine.with_store(move |s| s.person(&id).cloned()).await;
        reply("get_person", result)
    }

    async fn search_persons(&self, query: String) -> String {
        let result = self
            .engine
            .with_store(move |s| Ok(s.search_persons(&query).into_iter().cloned().collect()))
            .await;
        reply_list::<presence_core::Person>("search_persons", result)
    }

    /// Enroll from a JSON profile and the raw bytes of an uploaded image.
    async fn enroll_person(&self, profile_json: String, file_name: String, image: Vec<u8>) -> String {
        tracing::info!(file_name, bytes = image.len(), "enroll requested");
        let result = match parse_json::<NewPerson>("profile", &profile_json) {
            Ok(profile) => self.engine.enroll(profile, file_name, image).await,
            Err(e) => Err(e),
        };
        reply("enroll_person", result)
    }

    async fn update_person(&self, id: String, patch_json: String) -> String {
        let result = match parse_json::<PersonPatch>("patch", &patch_json) {
            Ok(patch) => {
                self.engine
                    .with_store(move |s| s.update_person(&id, patch, Local::now().naive_local()))
                    .await
            }
            Err(e) => Err(e),
        };
        reply("update_person", result)
    }

    async fn remove_person(&self, id: String) -> String {
        let result = self
            .engine
            .with_store(move |s| s.remove_person(&id).map(|p| format!("{} removed", p.name)))
            .await;
        reply_message("remove_person", result)
    }

    /// Remove the only person with this name; fails if the name is shared.
    async fn remove_person_by_name(&self, name: String) -> String {
        let result = self
            .engine
            .with_store(move |s| s.remove_by_name(&name).map(|p| format!("{} removed", p.name)))
            .await;
        reply_message("remove_person_by_name", result)
    }

    async fn recognize(&self, image: Vec<u8>) -> String {
        reply("recognize", self.engine.recognize(image).await)
    }

    async fn check_in(&self, image: Vec<u8>) -> String {
        reply("check_in", self.engine.check_in(image).await)
    }

    /// Manual attendance entry. Empty `date` or `time` means now.
    async fn record_attendance(&self, person_id: String, date: String, time: String) -> String {
        let result = match parse_moment(Some(&date), Some(&time), Local::now().naive_local()) {
            Ok(at) => {
                self.engine
                    .with_store(move |s| {
                        s.record_attendance(&person_id, at).map(|outcome| match outcome {
                            presence_core::RecordOutcome::Inserted(record) => {
                                json!({ "recorded": true, "record": record })
                            }
                            presence_core::RecordOutcome::Duplicate => json!({ "recorded": false }),
                        })
                    })
                    .await
            }
            Err(e) => Err(EngineError::InvalidRequest(format!("date/time: {e}"))),
        };
        reply("record_attendance", result)
    }

    /// `filter_json` may carry `person_id`, `date_from` and `date_to`.
    async fn list_attendance(&self, filter_json: String) -> String {
        let result = match parse_json::<AttendanceFilter>("filter", &filter_json) {
            Ok(filter) => {
                self.engine
                    .with_store(move |s| Ok(s.attendance(&filter).into_iter().cloned().collect()))
                    .await
            }
            Err(e) => Err(e),
        };
        reply_list::<presence_core::AttendanceRecord>("list_attendance", result)
    }

    async fn person_attendance(&self, id: String) -> String {
        let result = self
            .engine
            .with_store(move |s| {
                let (person, records) = s.person_attendance(&id)?;
                Ok(json!({
                    "person": person,
                    "total": records.len(),
                    "attendance": records,
                }))
            })
            .await;
        reply("person_attendance", result)
    }

    async fn list_absences(&self) -> String {
        let result = self.engine.with_store(|s| Ok(s.absences().to_vec())).await;
        reply_list("list_absences", result)
    }

    async fn set_absence_reason(&self, person_id: String, reason: String) -> String {
        let result = self
            .engine
            .with_store(move |s| s.set_absence_reason(&person_id, &reason))
            .await;
        reply("set_absence_reason", result)
    }

    async fn generate_absences(&self) -> String {
        let today = today();
        let result = self
            .engine
            .with_store(move |s| s.generate_absences(today).map(<[_]>::to_vec))
            .await;
        reply_list("generate_absences", result)
    }

    async fn reencode_all(&self) -> String {
        let result = self
            .engine
            .reencode_all()
            .await
            .map(|n| format!("{n} faces encoded"));
        reply_message("reencode_all", result)
    }

    async fn stats(&self) -> String {
        let today = today();
        reply("stats", self.engine.with_store(move |s| Ok(s.stats(today))).await)
    }

    /// Return daemon status information.
    async fn status(&self) -> String {
        let provider_url = self.provider_url.clone();
        let kiosk = self.kiosk_enabled;
        let result = self
            .engine
            .with_store(move |s| {
                Ok(json!({
                    "version": env!("CARGO_PKG_VERSION"),
                    "data_dir": s.layout().root(),
                    "persons": s.persons().len(),
                    "gallery": s.gallery().len(),
                    "tolerance": s.matcher().tolerance,
                    "embedding_dim": s.matcher().dimension,
                    "provider_url": provider_url,
                    "kiosk": kiosk,
                }))
            })
            .await;
        reply("status", result)
    }
}
