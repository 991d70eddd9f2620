use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::i18n::TargetLanguage;

/// 单个章节的最终正文，每个章节恰好产生一次
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalSectionContent {
    pub section_index: usize,
    pub section_name: String,
    pub text: String,
    /// 章节因失败或取消而使用了占位内容
    pub placeholder: bool,
}

/// 结论与参考文献的提取目标
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ConclusionAndReferences {
    /// The conclusion of the report, summarizing the key findings of all sections
    pub conclusion: String,
    /// The list of references, each formatted as "Title - URL"
    pub references: Vec<String>,
}

/// 最终报告
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalReport {
    pub title: String,
    /// 按 section_index 升序
    pub sections: Vec<FinalSectionContent>,
    pub conclusion: String,
    pub references: Vec<String>,
}

impl FinalReport {
    pub fn new(
        title: &str,
        mut sections: Vec<FinalSectionContent>,
        conclusion: String,
        references: Vec<String>,
    ) -> Self {
        sections.sort_by_key(|s| s.section_index);

        let mut seen = HashSet::new();
        let references = references
            .into_iter()
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty() && seen.insert(r.clone()))
            .collect();

        Self {
            title: title.to_string(),
            sections,
            conclusion,
            references,
        }
    }

    /// 渲染为 Markdown 文档
    pub fn render(&self, language: &TargetLanguage) -> String {
        let mut doc = format!("# {}\n\n", self.title);

        for section in &self.sections {
            doc.push_str(section.text.trim());
            doc.push_str("\n\n");
        }

        doc.push_str(&format!("## {}\n\n", language.conclusion_heading()));
        doc.push_str(self.conclusion.trim());
        doc.push_str("\n\n");

        doc.push_str(&format!("## {}\n\n", language.references_heading()));
        for (i, reference) in self.references.iter().enumerate() {
            doc.push_str(&format!("{}. {}\n", i + 1, reference));
        }

        doc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn content(index: usize, text: &str) -> FinalSectionContent {
        FinalSectionContent {
            section_index: index,
            section_name: format!("S{}", index),
            text: text.to_string(),
            placeholder: false,
        }
    }

    #[test]
    fn test_sections_sorted_and_references_deduplicated() {
        let report = FinalReport::new(
            "SVM",
            vec![content(2, "## C"), content(0, "## A"), content(1, "## B")],
            "done".to_string(),
            vec![
                "A - https://a".to_string(),
                "B - https://b".to_string(),
                "A - https://a".to_string(),
                " ".to_string(),
            ],
        );

        let order: Vec<_> = report.sections.iter().map(|s| s.section_index).collect();
        assert_eq!(order, vec![0, 1, 2]);
        assert_eq!(report.references.len(), 2);

        let text = report.render(&TargetLanguage::English);
        assert!(text.starts_with("# SVM\n"));
        let a = text.find("## A").unwrap();
        let b = text.find("## B").unwrap();
        let c = text.find("## C").unwrap();
        let conclusion = text.find("## Conclusion").unwrap();
        let refs = text.find("## References").unwrap();
        assert!(a < b && b < c && c < conclusion && conclusion < refs);
        assert!(text.contains("2. B - https://b"));
    }
}
