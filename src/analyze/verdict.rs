//! Classifier verdicts and the defensive parser for the model's reply.
//!
//! The model is asked for a small JSON object, but its reply is untrusted text:
//! it may arrive wrapped in markdown fences, with prose around it, with the
//! wrong field types or with a score outside the allowed band. Anything that
//! does not match the expected shape exactly becomes [`ClassifyError`], which
//! callers turn into [`Verdict::Unscored`].

use once_cell::sync::OnceCell;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ClassifyError;

pub const MIN_SCORE: u8 = 1;
pub const MAX_SCORE: u8 = 5;
const MAX_REASON_CHARS: usize = 300;

/// Which verdict shape the classifier asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifyMode {
    /// `{"score": 1..5, "reason": "..."}`, used for ranking after storage.
    #[default]
    Graded,
    /// `{"is_relevant": bool, "reason": "..."}`, used to filter before storage.
    Relevance,
}

impl std::str::FromStr for ClassifyMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "graded" | "score" => Ok(ClassifyMode::Graded),
            "relevance" | "filter" => Ok(ClassifyMode::Relevance),
            other => anyhow::bail!("unknown classify mode: {other}"),
        }
    }
}

/// Outcome of classifying one item. Stored flattened into the item record.
///
/// Reading back is lenient (see [`VerdictRecord`]): a bad verdict field costs
/// the item its verdict, never the whole data file.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    Scored {
        #[serde(rename = "ai_score")]
        score: u8,
        #[serde(rename = "ai_reason")]
        reason: String,
    },
    Relevance {
        #[serde(rename = "ai_relevant")]
        relevant: bool,
        #[serde(rename = "ai_reason")]
        reason: String,
    },
    #[default]
    Unscored,
}

/// On-disk verdict fields as found, before validation. Items written before
/// the `verdict` tag existed carry only `ai_score` / `ai_reason`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct VerdictRecord {
    verdict: Option<String>,
    ai_score: Option<Value>,
    ai_relevant: Option<Value>,
    ai_reason: Option<Value>,
}

impl From<VerdictRecord> for Verdict {
    fn from(r: VerdictRecord) -> Self {
        let reason = r.ai_reason.as_ref().and_then(Value::as_str).unwrap_or("");
        let score = r.ai_score.as_ref().and_then(|v| match v {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        });
        let relevant = r.ai_relevant.as_ref().and_then(Value::as_bool);
        match (r.verdict.as_deref(), score, relevant) {
            (Some("scored"), Some(score), _) | (None, Some(score), _) => {
                Verdict::scored(score, reason).unwrap_or_default()
            }
            (Some("relevance"), _, Some(relevant)) | (None, None, Some(relevant)) => {
                Verdict::relevance(relevant, reason)
            }
            _ => Verdict::Unscored,
        }
    }
}

impl<'de> Deserialize<'de> for Verdict {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        VerdictRecord::deserialize(deserializer).map(Verdict::from)
    }
}

impl Verdict {
    /// Only scores in `MIN_SCORE..=MAX_SCORE` produce a verdict.
    pub fn scored(score: i64, reason: &str) -> Option<Self> {
        let score = u8::try_from(score).ok()?;
        if !(MIN_SCORE..=MAX_SCORE).contains(&score) {
            return None;
        }
        Some(Verdict::Scored {
            score,
            reason: sanitize_reason(reason),
        })
    }

    pub fn relevance(relevant: bool, reason: &str) -> Self {
        Verdict::Relevance {
            relevant,
            reason: sanitize_reason(reason),
        }
    }

    pub fn score(&self) -> Option<u8> {
        match self {
            Verdict::Scored { score, .. } => Some(*score),
            _ => None,
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Verdict::Scored { reason, .. } | Verdict::Relevance { reason, .. } => {
                Some(reason.as_str())
            }
            Verdict::Unscored => None,
        }
    }

    pub fn is_relevant(&self) -> Option<bool> {
        match self {
            Verdict::Relevance { relevant, .. } => Some(*relevant),
            _ => None,
        }
    }

    pub fn is_unscored(&self) -> bool {
        matches!(self, Verdict::Unscored)
    }

    /// Re-checks invariants on data read back from disk.
    pub(crate) fn validated(self) -> Self {
        match self {
            Verdict::Scored { score, .. } if !(MIN_SCORE..=MAX_SCORE).contains(&score) => {
                Verdict::Unscored
            }
            v => v,
        }
    }
}

/// Removes markdown code fences, or failing that, prose around the outermost `{...}`.
pub fn strip_fences(raw: &str) -> &str {
    static RE_FENCE: OnceCell<Regex> = OnceCell::new();
    let re = RE_FENCE.get_or_init(|| {
        Regex::new(r"(?s)```[A-Za-z0-9_-]*\s*(.*?)\s*```").expect("fence regex")
    });
    let trimmed = raw.trim();
    if let Some(inner) = re.captures(trimmed).and_then(|c| c.get(1)) {
        return inner.as_str().trim();
    }
    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => trimmed,
    }
}

/// Parses one model reply into a verdict of the requested shape.
pub fn parse_reply(mode: ClassifyMode, raw: &str) -> Result<Verdict, ClassifyError> {
    let payload = strip_fences(raw);
    if payload.is_empty() {
        return Err(ClassifyError::EmptyReply);
    }
    let value: Value = serde_json::from_str(payload)
        .map_err(|e| ClassifyError::Malformed(format!("not JSON: {e}")))?;
    let obj = value
        .as_object()
        .ok_or_else(|| ClassifyError::Malformed("reply is not a JSON object".into()))?;

    let reason = obj
        .get("reason")
        .and_then(Value::as_str)
        .ok_or_else(|| ClassifyError::Malformed("missing string field `reason`".into()))?;

    match mode {
        ClassifyMode::Graded => {
            let raw_score = obj
                .get("score")
                .ok_or_else(|| ClassifyError::Malformed("missing field `score`".into()))?;
            let score = raw_score
                .as_i64()
                .ok_or_else(|| ClassifyError::Malformed(format!("score is not an integer: {raw_score}")))?;
            Verdict::scored(score, reason).ok_or(ClassifyError::OutOfRange(score))
        }
        ClassifyMode::Relevance => {
            let relevant = obj
                .get("is_relevant")
                .and_then(Value::as_bool)
                .ok_or_else(|| ClassifyError::Malformed("missing bool field `is_relevant`".into()))?;
            Ok(Verdict::relevance(relevant, reason))
        }
    }
}

/// Single line, collapsed whitespace, bounded length.
pub fn sanitize_reason(input: &str) -> String {
    let mut out = String::with_capacity(input.len().min(MAX_REASON_CHARS));
    let mut prev_space = false;
    let mut count = 0usize;
    for ch in input.chars() {
        let c = if ch.is_whitespace() || ch.is_control() {
            ' '
        } else {
            ch
        };
        if c == ' ' {
            if !prev_space && !out.is_empty() {
                out.push(' ');
                count += 1;
            }
            prev_space = true;
        } else {
            out.push(c);
            count += 1;
            prev_space = false;
        }
        if count >= MAX_REASON_CHARS {
            break;
        }
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fenced_json_is_unwrapped() {
        let raw = "```json\n{\"score\": 4, \"reason\": \"Crypto enforcement action\"}\n```";
        let v = parse_reply(ClassifyMode::Graded, raw).unwrap();
        assert_eq!(v.score(), Some(4));
        assert_eq!(v.reason(), Some("Crypto enforcement action"));
    }

    #[test]
    fn prose_around_object_is_ignored() {
        let raw = "Sure! Here you go: {\"is_relevant\": true, \"reason\": \"token offering\"} Hope it helps.";
        let v = parse_reply(ClassifyMode::Relevance, raw).unwrap();
        assert_eq!(v.is_relevant(), Some(true));
    }

    #[test]
    fn out_of_range_scores_are_rejected() {
        for raw in [
            r#"{"score": 7, "reason": "n/a"}"#,
            r#"{"score": 0, "reason": "n/a"}"#,
            r#"{"score": -2, "reason": "n/a"}"#,
        ] {
            assert!(matches!(
                parse_reply(ClassifyMode::Graded, raw),
                Err(ClassifyError::OutOfRange(_))
            ));
        }
    }

    #[test]
    fn wrong_types_and_missing_fields_are_malformed() {
        for raw in [
            r#"{"score": "4", "reason": "x"}"#,
            r#"{"score": 3.5, "reason": "x"}"#,
            r#"{"score": 3}"#,
            r#"{"reason": "x"}"#,
            r#"[1, 2, 3]"#,
            "I cannot classify this.",
        ] {
            assert!(
                matches!(
                    parse_reply(ClassifyMode::Graded, raw),
                    Err(ClassifyError::Malformed(_))
                ),
                "expected malformed for {raw}"
            );
        }
        assert!(matches!(
            parse_reply(ClassifyMode::Relevance, r#"{"is_relevant": "yes", "reason": "x"}"#),
            Err(ClassifyError::Malformed(_))
        ));
        assert!(matches!(
            parse_reply(ClassifyMode::Graded, "   "),
            Err(ClassifyError::EmptyReply)
        ));
    }

    #[test]
    fn sanitize_collapses_and_caps() {
        assert_eq!(sanitize_reason("  a\n\tb   c "), "a b c");
        let long = "x".repeat(1000);
        assert_eq!(sanitize_reason(&long).chars().count(), MAX_REASON_CHARS);
    }

    #[test]
    fn verdict_flattens_into_record_fields() {
        let v = Verdict::scored(3, "ok").unwrap();
        let json = serde_json::to_value(&v).unwrap();
        assert_eq!(json["verdict"], "scored");
        assert_eq!(json["ai_score"], 3);
        assert_eq!(json["ai_reason"], "ok");
        assert_eq!(
            serde_json::to_value(Verdict::Unscored).unwrap()["verdict"],
            "unscored"
        );
    }

    #[test]
    fn stored_fields_read_back_leniently() {
        let read = |v: Value| serde_json::from_value::<Verdict>(v).unwrap();

        assert_eq!(read(serde_json::json!({})), Verdict::Unscored);
        assert_eq!(
            read(serde_json::json!({"ai_score": 4, "ai_reason": "ICO"})),
            Verdict::scored(4, "ICO").unwrap()
        );
        assert_eq!(read(serde_json::json!({"ai_score": null, "ai_reason": null})), Verdict::Unscored);
        assert_eq!(
            read(serde_json::json!({"verdict": "scored", "ai_score": 300, "ai_reason": "x"})),
            Verdict::Unscored
        );
        assert_eq!(read(serde_json::json!({"ai_score": "five"})), Verdict::Unscored);
        assert_eq!(
            read(serde_json::json!({"verdict": "relevance", "ai_relevant": true, "ai_reason": 7})),
            Verdict::relevance(true, "")
        );
        assert_eq!(read(serde_json::json!({"verdict": "nonsense"})), Verdict::Unscored);
    }

    #[test]
    fn mode_parses_from_env_strings() {
        assert_eq!("Relevance".parse::<ClassifyMode>().unwrap(), ClassifyMode::Relevance);
        assert_eq!("graded".parse::<ClassifyMode>().unwrap(), ClassifyMode::Graded);
        assert!("other".parse::<ClassifyMode>().is_err());
    }
}
