//! Voicemail content extraction and notification formatting.
//!
//! Content extraction is a collaborator behind the [`VoicemailReader`] seam;
//! the default implementation summarizes record metadata only. A
//! speech-to-text reader can be slotted in without touching the relay flow.

use anyhow::Result;
use async_trait::async_trait;

use crate::platform::{Credential, VoicemailRecord};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MailSummary {
    pub caller_name: Option<String>,
    pub caller_number: Option<String>,
    pub received: Option<String>,
    pub duration_secs: Option<i64>,
    pub transcription: Option<String>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VoicemailReader: Send + Sync {
    /// Extract a relay-ready summary from one voicemail record. The token is
    /// available for implementations that fetch attachment content.
    async fn read_mail(&self, mail: &VoicemailRecord, token: &Credential) -> Result<MailSummary>;
}

/// Summarizes the fields already present on the record, without downloading
/// or transcribing audio.
#[derive(Debug, Default, Clone)]
pub struct MetadataReader;

#[async_trait]
impl VoicemailReader for MetadataReader {
    async fn read_mail(&self, mail: &VoicemailRecord, _token: &Credential) -> Result<MailSummary> {
        let (caller_name, caller_number) = match &mail.from {
            Some(from) => (from.name.clone(), from.phone_number.clone()),
            None => (None, None),
        };
        Ok(MailSummary {
            caller_name,
            caller_number,
            received: mail.creation_time.clone(),
            duration_secs: mail.vm_duration,
            transcription: None,
        })
    }
}

/// The text posted into a chat group for one voicemail.
pub fn format_notification(owner_id: &str, summary: &MailSummary) -> String {
    let caller = match (&summary.caller_name, &summary.caller_number) {
        (Some(name), Some(number)) => format!("{name} ({number})"),
        (Some(name), None) => name.clone(),
        (None, Some(number)) => number.clone(),
        (None, None) => "unknown caller".to_string(),
    };
    let mut text = format!("New voicemail for extension {owner_id}\nFrom: {caller}");
    if let Some(ref received) = summary.received {
        text.push_str(&format!("\nReceived: {received}"));
    }
    if let Some(duration) = summary.duration_secs {
        text.push_str(&format!("\nDuration: {duration}s"));
    }
    if let Some(ref transcription) = summary.transcription {
        text.push_str(&format!("\nTranscription: {transcription}"));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::testing::{credential, harness_with_reader};
    use std::sync::Arc;

    #[tokio::test]
    async fn metadata_reader_summarizes_record_fields() {
        let mail: VoicemailRecord = serde_json::from_value(serde_json::json!({
            "from": { "phoneNumber": "+15551234567", "name": "Ada" },
            "creationTime": "2026-08-01T12:00:00Z",
            "vmDuration": 42,
        }))
        .unwrap();

        let summary = MetadataReader
            .read_mail(&mail, &credential("u1"))
            .await
            .unwrap();
        assert_eq!(summary.caller_name.as_deref(), Some("Ada"));
        assert_eq!(summary.duration_secs, Some(42));
        assert!(summary.transcription.is_none());
    }

    #[test]
    fn format_handles_missing_fields() {
        let text = format_notification("u1", &MailSummary::default());
        assert_eq!(text, "New voicemail for extension u1\nFrom: unknown caller");
    }

    #[test]
    fn format_includes_transcription_when_present() {
        let summary = MailSummary {
            caller_number: Some("+15550000000".to_string()),
            transcription: Some("call me back".to_string()),
            ..Default::default()
        };
        let text = format_notification("u1", &summary);
        assert!(text.contains("From: +15550000000"));
        assert!(text.ends_with("Transcription: call me back"));
    }

    #[tokio::test]
    async fn reader_failure_still_relays_a_generic_notification() {
        let mut reader = MockVoicemailReader::new();
        reader
            .expect_read_mail()
            .returning(|_, _| Err(anyhow::anyhow!("attachment fetch failed")));

        let h = harness_with_reader(Arc::new(reader))
            .with_bot("b1")
            .await
            .with_user("u1", &[("g1", "b1")])
            .await;
        h.user_api.with(|s| {
            s.voicemails = vec![VoicemailRecord::default()];
        });

        let user = h.registry.user("u1").await.unwrap();
        user.process_voice_mail(&h.registry, 10).await;

        let posted = h.bot_api.with(|s| s.posted.clone());
        assert_eq!(posted.len(), 1);
        assert!(posted[0].1.starts_with("New voicemail for extension u1"));
    }
}
