//! Decoding of recorded answers and the speech features derived from their
//! transcripts.

use crate::error::InterviewError;
use crate::oracle::{Transcriber, with_timeout};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Serialize;
use std::io::Cursor;
use std::time::Duration;

const DEFAULT_MIME_TYPE: &str = "audio/wav";
const FILLER_WORDS: &[&str] = &[
    "um", "umm", "uh", "uhh", "er", "erm", "ah", "hmm", "like", "basically", "actually",
    "literally",
];

#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("audio payload is not valid base64: {0}")]
    InvalidBase64(#[from] base64::DecodeError),
    #[error("audio payload is empty")]
    Empty,
}

/// A recorded answer as uploaded by the client.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioClip {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl AudioClip {
    /// Parses `data:<mime>;base64,<payload>`. Anything else is treated as raw
    /// base64 (after the last comma, if any) holding WAV audio.
    pub fn from_data_uri(uri: &str) -> Result<Self, AudioError> {
        let uri = uri.trim();
        let (mime_type, payload) = match uri
            .strip_prefix("data:")
            .and_then(|rest| rest.split_once(";base64,"))
        {
            Some((mime, payload)) if !mime.is_empty() => (mime.to_string(), payload),
            _ => (
                DEFAULT_MIME_TYPE.to_string(),
                uri.rsplit(',').next().unwrap_or(uri),
            ),
        };
        let bytes = STANDARD.decode(payload.trim())?;
        if bytes.is_empty() {
            return Err(AudioError::Empty);
        }
        Ok(Self { mime_type, bytes })
    }

    /// File extension matching the MIME type, used when uploading the clip.
    pub fn extension(&self) -> &str {
        let subtype = self
            .mime_type
            .split('/')
            .nth(1)
            .and_then(|s| s.split(';').next())
            .unwrap_or("wav");
        match subtype {
            "mpeg" => "mp3",
            "x-wav" | "wave" => "wav",
            "" => "wav",
            other => other,
        }
    }

    /// Length of the clip in seconds. Only WAV can be measured; other
    /// containers report 0.
    pub fn duration_secs(&self) -> f64 {
        let Ok(reader) = hound::WavReader::new(Cursor::new(self.bytes.as_slice())) else {
            return 0.0;
        };
        let sample_rate = reader.spec().sample_rate;
        if sample_rate == 0 {
            return 0.0;
        }
        f64::from(reader.duration()) / f64::from(sample_rate)
    }
}

/// Pace and hesitation measures for one answer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechFeatures {
    pub speech_rate_wpm: f64,
    pub filler_rate: f64,
}

impl SpeechFeatures {
    pub fn from_transcript(transcript: &str, duration_secs: f64) -> Self {
        let words: Vec<String> = transcript
            .split_whitespace()
            .map(|word| {
                word.trim_matches(|c: char| !c.is_alphanumeric() && c != '\'')
                    .to_lowercase()
            })
            .filter(|word| !word.is_empty())
            .collect();
        if words.is_empty() {
            return Self {
                speech_rate_wpm: 0.0,
                filler_rate: 0.0,
            };
        }

        let fillers = words
            .iter()
            .filter(|word| FILLER_WORDS.contains(&word.as_str()))
            .count();
        let speech_rate_wpm = if duration_secs > 0.0 {
            words.len() as f64 * 60.0 / duration_secs
        } else {
            0.0
        };
        Self {
            speech_rate_wpm: round2(speech_rate_wpm),
            filler_rate: round2(fillers as f64 / words.len() as f64),
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// The transcript of one answer plus what was measured about it.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscribedAnswer {
    pub transcript: String,
    pub duration_secs: f64,
    pub features: SpeechFeatures,
}

/// Decodes `data_uri`, transcribes it and derives speech features.
///
/// Unlike question generation there is no fallback text for a failed
/// transcription, so oracle failures surface as `ServiceUnavailable`.
pub async fn transcribe_answer(
    transcriber: &dyn Transcriber,
    data_uri: &str,
    limit: Duration,
) -> Result<TranscribedAnswer, InterviewError> {
    let clip = AudioClip::from_data_uri(data_uri)?;
    let duration_secs = clip.duration_secs();
    tracing::debug!(
        "Transcribing {} bytes of {} ({:.2}s)",
        clip.bytes.len(),
        clip.mime_type,
        duration_secs
    );

    let transcript = with_timeout(limit, transcriber.transcribe(&clip))
        .await
        .map_err(|e| InterviewError::ServiceUnavailable {
            service: "transcription",
            reason: e.to_string(),
        })?;
    let transcript = transcript.trim().to_string();
    let features = SpeechFeatures::from_transcript(&transcript, duration_secs);

    Ok(TranscribedAnswer {
        transcript,
        duration_secs,
        features,
    })
}
