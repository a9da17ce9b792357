// Profile Models - fixed-schema personality profile synthesized from onboarding

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Five-trait personality scores, each in 0..=100
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BigFive {
    pub openness: f64,
    pub conscientiousness: f64,
    pub extraversion: f64,
    pub agreeableness: f64,
    pub neuroticism: f64,
}

impl BigFive {
    const TRAITS: [&'static str; 5] = [
        "openness",
        "conscientiousness",
        "extraversion",
        "agreeableness",
        "neuroticism",
    ];

    fn slot(&mut self, name: &str) -> Option<&mut f64> {
        match name {
            "openness" => Some(&mut self.openness),
            "conscientiousness" => Some(&mut self.conscientiousness),
            "extraversion" => Some(&mut self.extraversion),
            "agreeableness" => Some(&mut self.agreeableness),
            "neuroticism" => Some(&mut self.neuroticism),
            _ => None,
        }
    }

    /// Apply every recognised trait in `value`, returning how many were set.
    /// Numbers and numeric strings are accepted; everything else is skipped.
    fn merge_from(&mut self, value: &Value) -> usize {
        let Some(obj) = value.as_object() else {
            return 0;
        };

        let mut applied = 0;
        for name in Self::TRAITS {
            let Some(score) = obj.get(name).and_then(score_from_value) else {
                continue;
            };
            if let Some(slot) = self.slot(name) {
                *slot = score;
                applied += 1;
            }
        }
        applied
    }
}

fn score_from_value(value: &Value) -> Option<f64> {
    let raw = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().trim_end_matches('%').parse::<f64>().ok()?,
        _ => return None,
    };
    if raw.is_finite() {
        Some(raw.clamp(0.0, 100.0))
    } else {
        None
    }
}

/// Coerce a model value into a string field. Scalars are stringified,
/// arrays are joined, null and objects become empty.
fn string_from_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Array(_) => list_from_value(value).join(", "),
        Value::Null | Value::Object(_) => String::new(),
    }
}

/// Coerce a model value into a list field. A lone string becomes a
/// one-item list; non-scalar items are dropped.
fn list_from_value(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
                Value::Number(n) => Some(n.to_string()),
                Value::Bool(b) => Some(b.to_string()),
                _ => None,
            })
            .collect(),
        Value::String(s) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => Vec::new(),
    }
}

fn replace_if_different<T: PartialEq>(slot: &mut T, next: T) -> bool {
    if *slot == next {
        return false;
    }
    *slot = next;
    true
}

/// `vibe_summary` -> `vibeSummary`; keys already in camelCase pass through.
pub fn to_camel_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut upper_next = false;
    for c in key.trim().chars() {
        if c == '_' || c == '-' || c == ' ' {
            upper_next = !out.is_empty();
        } else if upper_next {
            out.extend(c.to_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }
    out
}

macro_rules! profile_schema {
    (
        strings { $($s:ident => $skey:literal),* $(,)? }
        lists { $($l:ident => $lkey:literal),* $(,)? }
    ) => {
        /// The synthesized personality profile.
        ///
        /// Every schema field is always present; unknown keys returned by the
        /// model are kept in `extra` and never read by this crate.
        #[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
        #[serde(rename_all = "camelCase")]
        pub struct Profile {
            $( #[serde(default)] pub $s: String, )*
            $( #[serde(default)] pub $l: Vec<String>, )*
            #[serde(default)]
            pub big_five: BigFive,
            #[serde(flatten, default)]
            pub extra: Map<String, Value>,
        }

        /// Wire names of all string fields
        pub const STRING_FIELDS: &[&str] = &[$($skey),*];
        /// Wire names of all list fields
        pub const LIST_FIELDS: &[&str] = &[$($lkey),*];

        impl Profile {
            /// Assign a known field from a model value. Returns false for unknown keys.
            fn assign(&mut self, key: &str, value: &Value) -> bool {
                match key {
                    $( $skey => { self.$s = string_from_value(value); true } )*
                    $( $lkey => { self.$l = list_from_value(value); true } )*
                    "bigFive" => { self.big_five.merge_from(value); true }
                    _ => false,
                }
            }

            /// Overwrite a field if the patch value has a usable type.
            /// Returns true only when the stored value actually changed.
            fn patch_field(&mut self, key: &str, value: &Value) -> bool {
                match key {
                    $( $skey => match value {
                        Value::String(_) | Value::Number(_) | Value::Bool(_) => {
                            replace_if_different(&mut self.$s, string_from_value(value))
                        }
                        _ => false,
                    }, )*
                    $( $lkey => match value {
                        Value::Array(_) | Value::String(_) => {
                            replace_if_different(&mut self.$l, list_from_value(value))
                        }
                        _ => false,
                    }, )*
                    "bigFive" => {
                        let before = self.big_five;
                        self.big_five.merge_from(value);
                        self.big_five != before
                    }
                    _ => false,
                }
            }

            /// True when no schema field carries any content
            pub fn is_blank(&self) -> bool {
                true $( && self.$s.is_empty() )* $( && self.$l.is_empty() )*
                    && self.big_five == BigFive::default()
            }
        }
    };
}

profile_schema! {
    strings {
        name => "name",
        age => "age",
        location => "location",
        hometown => "hometown",
        occupation => "occupation",
        education => "education",
        cultural_background => "culturalBackground",
        vibe_summary => "vibeSummary",
        one_liner => "oneLiner",
        life_story => "lifeStory",
        current_focus => "currentFocus",
        personality_summary => "personalitySummary",
        communication_style => "communicationStyle",
        social_style => "socialStyle",
        humor_style => "humorStyle",
        energy_level => "energyLevel",
        attachment_style => "attachmentStyle",
        love_language => "loveLanguage",
        inner_world => "innerWorld",
        emotional_patterns => "emotionalPatterns",
        family_relationship => "familyRelationship",
        friendship_style => "friendshipStyle",
        ideal_weekend => "idealWeekend",
        looking_for => "lookingFor",
    }
    lists {
        twyne_tags => "twyneTags",
        interests => "interests",
        hobbies => "hobbies",
        favorite_music => "favoriteMusic",
        favorite_media => "favoriteMedia",
        favorite_foods => "favoriteFoods",
        travel_places => "travelPlaces",
        languages => "languages",
        values => "values",
        strengths => "strengths",
        quirks => "quirks",
        fears => "fears",
        aspirations => "aspirations",
        life_goals => "lifeGoals",
        key_memories => "keyMemories",
        connection_preferences => "connectionPreferences",
        dealbreakers => "dealbreakers",
        talking_points => "talkingPoints",
    }
}

impl Profile {
    /// Total number of schema fields (strings, lists and the big-five record)
    pub fn field_count() -> usize {
        STRING_FIELDS.len() + LIST_FIELDS.len() + 1
    }

    /// Build a complete profile from whatever object the model produced.
    ///
    /// Keys are matched in camelCase or snake_case. Missing fields keep their
    /// defaults (`""`, `[]`, zeroed scores); non-object input yields a blank profile.
    pub fn from_llm_value(value: &Value) -> Self {
        let mut profile = Profile::default();
        let Some(obj) = value.as_object() else {
            return profile;
        };

        for (key, field_value) in obj {
            let canonical = to_camel_case(key);
            if !profile.assign(&canonical, field_value) {
                profile.extra.insert(key.clone(), field_value.clone());
            }
        }

        profile
    }

    /// Minimal profile handed out when synthesis cannot produce anything usable
    pub fn fallback() -> Self {
        Profile {
            vibe_summary: "A curious, warm person who's open to meeting new people and \
                           seeing where a good conversation leads."
                .to_string(),
            personality_summary: "Thoughtful and open-minded, with more to share once \
                                  the conversation gets going."
                .to_string(),
            twyne_tags: vec!["Curious".to_string(), "Open-minded".to_string()],
            ..Default::default()
        }
    }

    /// Apply a partial update: only schema fields present in `patch` with a
    /// usable type are overwritten. Returns the wire names of fields whose
    /// value differs afterwards; echoed values are not reported.
    pub fn apply_patch(&mut self, patch: &Map<String, Value>) -> Vec<String> {
        let mut changed = Vec::new();
        for (key, value) in patch {
            let canonical = to_camel_case(key);
            if self.patch_field(&canonical, value) {
                changed.push(canonical);
            } else {
                log::debug!("Ignoring profile patch key '{}'", key);
            }
        }
        changed
    }

    /// Serialize to a JSON object (always an object for a `Profile`)
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Object(Map::new()))
    }
}
