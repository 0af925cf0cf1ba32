//! Minimal local intents answered without the engine.

/// Utterances longer than this are never treated as a local intent.
const MAX_INTENT_WORDS: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalIntent {
    Greeting,
    Goodbye,
    CanYouHearMe,
    Acknowledgement,
}

impl LocalIntent {
    /// Classify a short caller utterance.
    pub fn classify(transcript: &str) -> Option<Self> {
        let normalized: String = transcript
            .chars()
            .map(|c| {
                if c.is_alphanumeric() || c == '\'' {
                    c.to_ascii_lowercase()
                } else {
                    ' '
                }
            })
            .collect();
        let words: Vec<&str> = normalized.split_whitespace().collect();
        if words.is_empty() || words.len() > MAX_INTENT_WORDS {
            return None;
        }
        let phrase = words.join(" ");

        if phrase.contains("hear me") || phrase.contains("anyone there") || phrase == "are you there"
        {
            return Some(Self::CanYouHearMe);
        }

        if words.iter().any(|w| matches!(*w, "bye" | "goodbye"))
            || phrase.contains("talk to you later")
        {
            return Some(Self::Goodbye);
        }
        if matches!(words[0], "hello" | "hi" | "hey" | "hiya")
            || phrase.starts_with("good morning")
            || phrase.starts_with("good afternoon")
            || phrase.starts_with("good evening")
        {
            return Some(Self::Greeting);
        }
        if words.iter().all(|w| {
            matches!(
                *w,
                "thanks" | "thank" | "you" | "okay" | "ok" | "great" | "cool" | "got" | "it"
                    | "alright" | "perfect" | "sounds" | "good"
            )
        }) {
            return Some(Self::Acknowledgement);
        }
        None
    }

    /// The canned reply spoken for this intent.
    pub fn reply(self) -> &'static str {
        match self {
            Self::Greeting => "Hi there! How can I help you today?",
            Self::Goodbye => "Thanks for calling. Goodbye!",
            Self::CanYouHearMe => "Yes, I can hear you. Go ahead.",
            Self::Acknowledgement => "Great. Is there anything else I can help with?",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Greeting => "greeting",
            Self::Goodbye => "goodbye",
            Self::CanYouHearMe => "can_you_hear_me",
            Self::Acknowledgement => "acknowledgement",
        }
    }
}
