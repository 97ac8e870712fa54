//! Note-generation prompt construction.
//!
//! Each style maps to a fixed instruction template whose section markers
//! (e.g. `【要点】`) are parsed by downstream consumers and must stay
//! byte-for-byte stable.

use std::fmt::Write;

/// Closed set of note styles. Unknown keys fall back to the default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NoteStyle {
    /// Faithful to the video's own structure and wording.
    #[default]
    VideoFaithful,
    /// Reorganized for understanding and recall, five labeled sections.
    UnderstandMemory,
    /// A single bullet-point section.
    Concise,
    /// The segments worth rewatching.
    Moments,
}

impl NoteStyle {
    /// Map a stored style key to a style; unknown or absent keys yield the
    /// default.
    pub fn from_key(key: Option<&str>) -> Self {
        match key.unwrap_or_default() {
            "understand_memory" => NoteStyle::UnderstandMemory,
            "concise" => NoteStyle::Concise,
            "moments" => NoteStyle::Moments,
            _ => NoteStyle::VideoFaithful,
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            NoteStyle::VideoFaithful => "video_faithful",
            NoteStyle::UnderstandMemory => "understand_memory",
            NoteStyle::Concise => "concise",
            NoteStyle::Moments => "moments",
        }
    }

    fn instructions(&self) -> &'static str {
        match self {
            NoteStyle::VideoFaithful => {
                "按视频原有的讲述顺序整理一份忠实的结构化笔记，保留讲者的关键表述与细节，\
                 不要添加转写中不存在的内容。\n\
                 输出格式：\n\
                 【标题】一句话概括视频主题\n\
                 【内容脉络】按讲述顺序分小节整理要点\n\
                 【金句摘录】列出值得记住的原话"
            }
            NoteStyle::UnderstandMemory => {
                "用便于理解和记忆的方式重新组织内容。\n\
                 输出格式（五个部分，标记需原样保留）：\n\
                 【核心概念】本视频最重要的概念，逐条说明\n\
                 【通俗解释】用日常语言解释这些概念\n\
                 【例子/类比】为每个核心概念给出一个例子或类比\n\
                 【记忆要点】便于背诵的简短要点\n\
                 【自测问题】3-5 个检验理解的问题"
            }
            NoteStyle::Concise => {
                "只输出一个要点清单。\n\
                 输出格式：\n\
                 【要点】每行一个要点，尽量精炼，不超过十条"
            }
            NoteStyle::Moments => {
                "找出视频中最值得回看的片段。\n\
                 输出格式：\n\
                 【精彩瞬间】逐条列出，每条说明该片段讲了什么、为什么值得回看"
            }
        }
    }
}

const JOKE_INSTRUCTION: &str = "在笔记结尾附上一个与视频主题相关的小笑话。";

/// Build the note-generation prompt. Pure and total: any transcript, any
/// style key and any remark produce a prompt.
pub fn build_note_prompt(
    transcript: &str,
    style: Option<&str>,
    remark: Option<&str>,
    include_joke: bool,
) -> String {
    let style = NoteStyle::from_key(style);
    let remark = remark
        .map(str::trim)
        .filter(|remark| !remark.is_empty())
        .unwrap_or("none");

    let mut prompt = String::new();
    prompt.push_str("You are a note-taking assistant. Create structured notes in Simplified Chinese.\n\n");
    prompt.push_str(style.instructions());
    let _ = write!(prompt, "\n\nStyle: {}", style.key());
    let _ = write!(prompt, "\nUser remark: {remark}");
    let _ = write!(prompt, "\n\nTranscript:\n{transcript}");
    if include_joke {
        let _ = write!(prompt, "\n\n{JOKE_INSTRUCTION}");
    }
    prompt
}
