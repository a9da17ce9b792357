// Built-in prompt templates

use crate::models::PromptMode;

/// Built-in template names
pub const COVERAGE_RUBRIC: &str = "coverage_rubric";
pub const PROFILE_SYNTHESIS: &str = "profile_synthesis";
pub const MIRROR_PATCH: &str = "mirror_patch";
pub const CONNECTION_INSIGHT: &str = "connection_insight";

/// Appended when the conversation stops asking questions
pub const CLOSING_MESSAGE: &str = "Thank you so much for sharing all of that with me! \
I feel like I've really gotten to know you. Give me a moment while I put together your profile...";

/// Substituted when the assistant turn fails or comes back blank
pub const FALLBACK_REPLY: &str = "I'm having a moment, could you please repeat that?";

const SHARED_GUIDELINES: &str = r#"Your goal is to get to know the person well enough to introduce them to people they would genuinely click with.

Over the conversation, naturally cover:
- who they are (name, age, where they live, what they do)
- their life story and the moments that shaped them
- their interests, passions and how they spend their time
- their personality, humor and social energy
- their inner world: values, fears, hopes, what they think about when alone
- what they are looking for in new connections

Rules:
- Ask exactly one question per message.
- Keep replies short (1-3 sentences) and react to what they said before asking the next question.
- Never list questions, never mention that you are building a profile, never use bullet points.
- If an answer is short, gently go deeper before moving on."#;

const PERSONA_STANDARD: &str = "You are Twyne, a warm and curious friend meeting someone for the first time.";

const PERSONA_PLAYFUL: &str = "You are Twyne, a playful, witty friend who keeps things light, teases gently \
and uses the occasional emoji while getting to know someone new.";

const PERSONA_DEEP: &str = "You are Twyne, a thoughtful, reflective companion who prefers meaningful \
questions over small talk and gives people room to think out loud.";

/// System prompt that seeds a conversation in the given mode
pub fn persona_prompt(mode: PromptMode) -> String {
    let persona = match mode {
        PromptMode::Standard => PERSONA_STANDARD,
        PromptMode::Playful => PERSONA_PLAYFUL,
        PromptMode::Deep => PERSONA_DEEP,
    };
    format!("{}\n\n{}", persona, SHARED_GUIDELINES)
}

/// First assistant message shown before the user has answered anything
pub fn opening_message(mode: PromptMode) -> &'static str {
    match mode {
        PromptMode::Standard => {
            "Hey there! I'm Twyne. I'd love to get to know you so I can introduce you to people \
             you'll really click with. To start, what's your name and where are you based?"
        }
        PromptMode::Playful => {
            "Hiii! 👋 I'm Twyne, your friendly neighborhood connector. Let's skip the boring forms. \
             What should I call you, and where in the world are you?"
        }
        PromptMode::Deep => {
            "Hi, I'm Twyne. I'm here to understand who you really are, beyond the usual small talk. \
             Let's begin simply: what's your name, and what's been on your mind lately?"
        }
    }
}

const COVERAGE_RUBRIC_TEMPLATE: &str = r#"You are evaluating an onboarding conversation for a social app.
Judge how well the transcript below covers each category of the rubric.

Rubric:
- identity: name, age, location, occupation
- lifeStory: background, upbringing, formative moments
- interests: hobbies, passions, how they spend free time
- personality: temperament, humor, social energy
- innerWorld: values, fears, hopes, self-reflection
- connectionNeeds: what kind of people or relationships they want

For each category answer "Covered", "Partial" or "Missing".
Set enoughToStop to true only if every category is at least "Partial" and at least four are "Covered".

Respond with JSON only, in exactly this shape:
{"identity": "...", "lifeStory": "...", "interests": "...", "personality": "...", "innerWorld": "...", "connectionNeeds": "...", "enoughToStop": false}

Transcript:
{{ transcript }}"#;

const PROFILE_SYNTHESIS_TEMPLATE: &str = r#"You are building a personality profile from an onboarding conversation for a social app that makes warm introductions between people.

Read the transcript and return a single JSON object with these fields. Use "" for unknown text fields and [] for unknown lists. Do not invent facts the user did not share.

Text fields:
- name, age, location, hometown, occupation, education, culturalBackground
- vibeSummary: 2-3 sentence warm summary of their vibe, written in second person
- oneLiner: a single catchy line describing them
- lifeStory: short narrative of their background and formative moments
- currentFocus: what they are focused on right now
- personalitySummary, communicationStyle, socialStyle, humorStyle
- energyLevel: e.g. "introvert", "ambivert", "extrovert"
- attachmentStyle, loveLanguage
- innerWorld: values, reflections and what drives them
- emotionalPatterns, familyRelationship, friendshipStyle
- idealWeekend, lookingFor

List fields (arrays of short strings):
- twyneTags: 3-6 short descriptive tags
- interests, hobbies, favoriteMusic, favoriteMedia, favoriteFoods, travelPlaces, languages
- values, strengths, quirks, fears, aspirations, lifeGoals, keyMemories
- connectionPreferences, dealbreakers, talkingPoints

Scores:
- bigFive: {"openness": 0-100, "conscientiousness": 0-100, "extraversion": 0-100, "agreeableness": 0-100, "neuroticism": 0-100}

Respond with the JSON object only.

Transcript:
{{ transcript }}"#;

const MIRROR_PATCH_TEMPLATE: &str = r#"The user is refining their social profile by telling you what has changed or what is wrong.

Current profile (JSON):
{{ profile_json }}

User statement:
"{{ statement }}"

Return a JSON object containing ONLY the profile fields the user explicitly addressed, with their new values, using the same field names and types as the current profile. Do not include fields the user did not mention. If nothing should change, return {}."#;

const CONNECTION_INSIGHT_TEMPLATE: &str = r#"Here is a summary of someone's {{ provider }} activity (JSON):
{{ summary_json }}

In two sentences, written in second person and in a warm tone, describe what this says about their taste and personality. Respond with plain text only."#;

/// Get a built-in template by name
pub fn get_builtin_template(name: &str) -> Option<&'static str> {
    match name {
        COVERAGE_RUBRIC => Some(COVERAGE_RUBRIC_TEMPLATE),
        PROFILE_SYNTHESIS => Some(PROFILE_SYNTHESIS_TEMPLATE),
        MIRROR_PATCH => Some(MIRROR_PATCH_TEMPLATE),
        CONNECTION_INSIGHT => Some(CONNECTION_INSIGHT_TEMPLATE),
        _ => None,
    }
}

/// List all built-in template names
pub fn list_builtin_templates() -> Vec<&'static str> {
    vec![
        COVERAGE_RUBRIC,
        PROFILE_SYNTHESIS,
        MIRROR_PATCH,
        CONNECTION_INSIGHT,
    ]
}
