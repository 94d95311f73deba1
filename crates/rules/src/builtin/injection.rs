//! Prompt injection detection.

use regex_lite::Regex;

use super::compile;
use crate::model::{Rule, RuleContext, RuleDecision, Transition};
use crate::RuleError;

const ID: &str = "prompt_injection";

const PATTERNS: &[&str] = &[
    r"(?i)ignore\s+(?:all\s+)?(?:the\s+)?(?:previous|prior|above)\s+(?:instructions|rules|prompts?)",
    r"(?i)disregard\s+(?:all\s+|your\s+|the\s+)?(?:previous|prior|above)",
    r"(?i)forget\s+(?:all\s+)?(?:your|previous|prior)\s+(?:instructions|rules)",
    r"(?i)you\s+are\s+now\s+(?:a|an|in)\b",
    r"(?i)(?:reveal|print|show)\s+(?:your|the)\s+system\s+prompt",
    r"(?i)developer\s+mode",
    r"忽略(?:之前|以上|上面|前面|所有)的?(?:指令|规则|提示|设定)",
    r"(?:无视|不要理会)(?:之前|以上|上面|所有)的?(?:指令|规则|限制)",
    r"你现在是(?:一个)?",
    r"系统提示词",
    r"(?:绕过|跳过)(?:安全|风控|审核)",
];

/// Blocks text that tries to override the assistant's instructions.
pub struct PromptInjectionRule {
    patterns: Vec<Regex>,
}

impl PromptInjectionRule {
    pub fn new() -> Result<Self, RuleError> {
        let patterns = PATTERNS
            .iter()
            .map(|p| compile(ID, p))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }
}

impl Rule for PromptInjectionRule {
    fn id(&self) -> &str {
        ID
    }

    fn description(&self) -> &str {
        "Blocks attempts to override the assistant's instructions"
    }

    fn applies_to(&self, _transition: &Transition) -> bool {
        true
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> RuleDecision {
        for text in ctx.scanned_texts() {
            if let Some(m) = self.patterns.iter().find_map(|p| p.find(text)) {
                return RuleDecision::block(ID, "检测到试图篡改助手指令的内容，本次操作已拦截")
                    .with_evidence(m.as_str());
            }
        }
        RuleDecision::pass(ID)
    }
}
