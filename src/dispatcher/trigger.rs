use std::collections::HashMap;
use std::fmt;

use crate::error::{Result, ServerError};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

/// 文档路径模式，如 `pingtrails/{pingtrailId}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl TriggerPattern {
    pub fn parse(pattern: &str) -> Result<Self> {
        let segments = pattern
            .trim_matches('/')
            .split('/')
            .map(|segment| {
                if segment.is_empty() {
                    return Err(ServerError::Configuration(format!(
                        "empty segment in trigger pattern '{}'",
                        pattern
                    )));
                }
                match segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                    Some("") => Err(ServerError::Configuration(format!(
                        "unnamed parameter in trigger pattern '{}'",
                        pattern
                    ))),
                    Some(name) => Ok(Segment::Param(name.to_string())),
                    None => Ok(Segment::Literal(segment.to_string())),
                }
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            raw: pattern.trim_matches('/').to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// 匹配文档路径，成功时返回路径参数
    pub fn matches(&self, document_path: &str) -> Option<HashMap<String, String>> {
        let parts: Vec<&str> = document_path.trim_matches('/').split('/').collect();
        if parts.len() != self.segments.len() {
            return None;
        }

        let mut params = HashMap::new();
        for (segment, part) in self.segments.iter().zip(parts) {
            match segment {
                Segment::Literal(literal) if literal == part => {}
                Segment::Literal(_) => return None,
                Segment::Param(_) if part.is_empty() => return None,
                Segment::Param(name) => {
                    params.insert(name.clone(), part.to_string());
                }
            }
        }
        Some(params)
    }
}

impl fmt::Display for TriggerPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_and_extracts_params() {
        let pattern = TriggerPattern::parse("pingtrails/{pingtrailId}").unwrap();
        let params = pattern.matches("pingtrails/T1").unwrap();
        assert_eq!(params.get("pingtrailId").map(String::as_str), Some("T1"));

        assert!(pattern.matches("friend_requests/R1").is_none());
        assert!(pattern.matches("pingtrails/T1/checkins/C1").is_none());
        assert!(pattern.matches("pingtrails/").is_none());
    }

    #[test]
    fn test_nested_pattern() {
        let pattern = TriggerPattern::parse("pingtrails/{trailId}/checkins/{checkinId}").unwrap();
        let params = pattern.matches("pingtrails/T1/checkins/C9").unwrap();
        assert_eq!(params["trailId"], "T1");
        assert_eq!(params["checkinId"], "C9");
    }

    #[test]
    fn test_invalid_patterns() {
        assert!(TriggerPattern::parse("pingtrails//{id}").is_err());
        assert!(TriggerPattern::parse("pingtrails/{}").is_err());
    }
}
