//! Detection of caller utterances that carry no request.

const FILLER_TOKENS: &[&str] = &[
    "uh", "um", "umm", "uhm", "er", "erm", "ah", "eh", "hm", "hmm", "hmmm", "mm", "mmm", "mhm",
    "uh-huh", "huh", "oh",
];

/// True for empty transcripts, transcripts of at most `max_chars` letters,
/// and transcripts made only of filler tokens.
pub fn is_filler(transcript: &str, max_chars: usize) -> bool {
    let letters = transcript.chars().filter(|c| c.is_alphabetic()).count();
    if letters <= max_chars {
        return true;
    }

    transcript
        .split_whitespace()
        .map(|word| {
            word.trim_matches(|c: char| !c.is_alphanumeric() && c != '-')
                .to_lowercase()
        })
        .filter(|word| !word.is_empty())
        .all(|word| FILLER_TOKENS.contains(&word.as_str()))
}
