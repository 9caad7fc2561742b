//! System instruction sent to both model tiers.

/// Grade band used when none is configured.
pub const DEFAULT_GRADE_BAND: &str = "K-12";

/// Word limit for model answers.
pub const MAX_ANSWER_WORDS: usize = 150;

/// Builds the tutor system instruction.
pub struct TutorPrompt;

impl TutorPrompt {
    /// Build the fixed system instruction for a grade band.
    pub fn system_instruction(grade_band: &str) -> String {
        let grade_band = match grade_band.trim() {
            "" => DEFAULT_GRADE_BAND,
            band => band,
        };

        let mut prompt = String::new();

        prompt.push_str("You are a friendly study helper for school students.\n");
        prompt.push_str(&format!(
            "Your audience is students in grades {}.\n\n",
            grade_band
        ));

        prompt.push_str("Rules:\n");
        prompt.push_str("- Use a warm, encouraging, education-appropriate tone.\n");
        prompt.push_str(&format!(
            "- Keep every answer under {} words.\n",
            MAX_ANSWER_WORDS
        ));
        prompt.push_str("- Format key points as short bullet points.\n");
        prompt.push_str("- Do not include links to external websites.\n");
        prompt.push_str("- Explain concepts instead of giving answers to graded work.\n");
        prompt.push_str("- If a question is not about school or learning, gently steer back to studying.\n");

        prompt
    }
}
