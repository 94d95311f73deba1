//! Offline generation collaborator.
//!
//! Answers small talk from a fixed phrasebook so the side-chat path streams
//! real text without a model. A model-backed [`Generator`] drops in through
//! [`crate::Services::with_generator`].

use async_trait::async_trait;
use waypoint_core::error::ProviderError;
use waypoint_core::{GenerationRequest, Generator};

pub const SIDE_CHAT_SYSTEM: &str =
    "你是一个旅行预订助手。闲聊时简短友好地回答，并在合适时引导用户回到行程规划。";

const PHRASEBOOK: &[(&[&str], &str)] = &[
    (
        &["你好", "您好", "hello", "hi", "嗨"],
        "你好！我是你的旅行助手。告诉我想去哪里、从哪出发、什么时候走，我来帮你规划行程、订机票和酒店。",
    ),
    (
        &["谢谢", "多谢", "thank"],
        "不客气！还有什么需要帮忙的，随时告诉我。",
    ),
    (
        &["你是谁", "你能做什么", "who are you", "what can you do"],
        "我可以帮你做三件事：生成旅行方案，搜索并预订机票和酒店，查询目的地天气。先说说你的出行计划吧。",
    ),
    (
        &["签证", "visa"],
        "签证要求因国籍和目的地而异，建议出发前在目的地使领馆官网确认最新政策。需要我先帮你安排机票和酒店吗？",
    ),
    (
        &["再见", "拜拜", "bye"],
        "再见，祝你旅途愉快！",
    ),
];

const FALLBACK: &str = "这个问题我不太擅长。我更擅长帮你规划旅行：告诉我目的地、出发城市和日期就可以开始。";

#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineGenerator;

#[async_trait]
impl Generator for OfflineGenerator {
    fn name(&self) -> &str {
        "offline"
    }

    async fn complete(&self, request: GenerationRequest) -> Result<String, ProviderError> {
        let prompt = request.prompt.to_lowercase();
        let reply = PHRASEBOOK
            .iter()
            .find(|(keys, _)| keys.iter().any(|k| prompt.contains(k)))
            .map_or(FALLBACK, |(_, reply)| *reply);
        Ok(reply.to_string())
    }
}
