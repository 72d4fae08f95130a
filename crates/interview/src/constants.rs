/// Clips shorter than this are treated as silence and skipped rather than
/// uploaded for transcription.
pub const MIN_CLIP_MS: u64 = 300;

pub mod prefixes {
    pub const ASK: &str = "ASK>";
    pub const REC: &str = "REC>";
    pub const PROC: &str = "PROC>";
    pub const SCORE: &str = "SCORE>";
    pub const WARN: &str = "WARN>";
}

pub mod messages {
    pub const NO_AUDIO: &str = "no audio captured";
    pub const SESSION_ABORTED: &str = "session aborted";
}

pub const DEFAULT_QUESTIONS: &[&str] = &[
    "Tell me about yourself and your background.",
    "Describe a challenging project you worked on and how you handled it.",
    "Why are you interested in this role?",
];
