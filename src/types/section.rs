use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// 报告中的一个顶层章节，独立调研
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Section {
    /// The name of this section of the report without its number
    #[serde(rename = "section_name")]
    pub name: String,
    /// Comprehensive descriptions of sub-sections, each combining the sub-section title and its bullet points into a fluid, natural-language description
    #[serde(rename = "sub_sections", default)]
    pub sub_section_descriptions: Vec<String>,
}

impl Section {
    pub fn new(name: impl Into<String>, sub_sections: Vec<String>) -> Self {
        Self {
            name: name.into(),
            sub_section_descriptions: sub_sections,
        }
    }

    /// 以提示词可读的形式展示章节
    pub fn describe(&self) -> String {
        let mut content = format!("Section: {}\n", self.name);
        for (i, sub) in self.sub_section_descriptions.iter().enumerate() {
            content.push_str(&format!("  {}. {}\n", i + 1, sub));
        }
        content
    }
}

/// 章节结构的提取目标
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Sections {
    /// A list of sections
    pub sections: Vec<Section>,
}

/// 单条检索查询
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct Query {
    /// A search query
    #[serde(rename = "query")]
    pub text: String,
}

impl Query {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// 查询列表的提取目标
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Queries {
    /// A list of search queries
    pub queries: Vec<Query>,
}

/// 反思结果在模型侧的原始形态：布尔值或一段反馈文本
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum FeedbackValue {
    Accepted(bool),
    Revise(String),
}

/// 反思环节的提取目标
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Feedback {
    /// Feedback on the section content. If the content is good for the section, return true (boolean), otherwise return a string of feedback on what is missing or incorrect.
    pub feedback: FeedbackValue,
}

const INSUFFICIENT_COVERAGE: &str =
    "The accumulated content does not yet cover the section sufficiently; search for the missing sub-topics.";

/// 反思结论：接受，或者给出缺失内容的反馈，二者只居其一
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReflectionVerdict {
    Accept,
    Revise(String),
}

impl ReflectionVerdict {
    pub fn is_accept(&self) -> bool {
        matches!(self, ReflectionVerdict::Accept)
    }

    /// 需要继续调研时的反馈文本；接受时为空
    pub fn feedback(&self) -> &str {
        match self {
            ReflectionVerdict::Accept => "",
            ReflectionVerdict::Revise(text) => text,
        }
    }
}

impl From<Feedback> for ReflectionVerdict {
    fn from(raw: Feedback) -> Self {
        match raw.feedback {
            FeedbackValue::Accepted(true) => ReflectionVerdict::Accept,
            FeedbackValue::Accepted(false) => {
                ReflectionVerdict::Revise(INSUFFICIENT_COVERAGE.to_string())
            }
            FeedbackValue::Revise(text) => {
                let trimmed = text.trim();
                if trimmed.eq_ignore_ascii_case("true") {
                    ReflectionVerdict::Accept
                } else if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("false") {
                    ReflectionVerdict::Revise(INSUFFICIENT_COVERAGE.to_string())
                } else {
                    ReflectionVerdict::Revise(trimmed.to_string())
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verdict(json: &str) -> ReflectionVerdict {
        serde_json::from_str::<Feedback>(json).unwrap().into()
    }

    #[test]
    fn test_boolean_true_is_accept() {
        assert_eq!(verdict(r#"{"feedback": true}"#), ReflectionVerdict::Accept);
    }

    #[test]
    fn test_text_feedback_is_revise() {
        let v = verdict(r#"{"feedback": "missing kernel trick details"}"#);
        assert_eq!(
            v,
            ReflectionVerdict::Revise("missing kernel trick details".to_string())
        );
        assert_eq!(v.feedback(), "missing kernel trick details");
    }

    #[test]
    fn test_stringified_booleans_are_normalized() {
        assert!(verdict(r#"{"feedback": "True"}"#).is_accept());
        assert!(!verdict(r#"{"feedback": "false"}"#).is_accept());
        assert!(!verdict(r#"{"feedback": false}"#).is_accept());
        assert!(!verdict(r#"{"feedback": "  "}"#).feedback().is_empty());
    }

    #[test]
    fn test_section_wire_names() {
        let section: Section = serde_json::from_str(
            r#"{"section_name": "Introduction", "sub_sections": ["History", "Motivation"]}"#,
        )
        .unwrap();
        assert_eq!(section.name, "Introduction");
        assert_eq!(section.sub_section_descriptions.len(), 2);
        assert!(section.describe().contains("2. Motivation"));
    }
}
