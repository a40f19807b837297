//! 用户画像：语言、偏好与人格设定
//!
//! 所有字段都带 serde 默认值，部分写入或旧格式的记录也能加载。

use serde::{Deserialize, Serialize};

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_true() -> bool {
    true
}

/// 用户偏好
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserPreferences {
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// 用户手动指定的语言；优先于检测到的语言
    #[serde(default)]
    pub custom_language: Option<String>,
    /// 回复末尾是否追加表情
    #[serde(default = "default_true")]
    pub decorations: bool,
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            custom_language: None,
            decorations: true,
        }
    }
}

/// 派生人格特征；缺失的字段由 [`PersonalityProfile::resolved`] 补默认值
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PersonalityTraits {
    #[serde(default)]
    pub tone: Option<String>,
    #[serde(default)]
    pub verbosity: Option<String>,
    #[serde(default)]
    pub humor: Option<bool>,
    #[serde(default)]
    pub interests: Vec<String>,
}

/// 人格设定：默认或派生
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "traits", rename_all = "snake_case")]
pub enum PersonalityProfile {
    #[default]
    Default,
    Derived(PersonalityTraits),
}

/// 所有字段已确定的人格
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedPersonality {
    pub tone: String,
    pub verbosity: String,
    pub humor: bool,
    pub interests: Vec<String>,
}

impl Default for ResolvedPersonality {
    fn default() -> Self {
        Self {
            tone: "friendly".to_string(),
            verbosity: "balanced".to_string(),
            humor: true,
            interests: Vec::new(),
        }
    }
}

impl PersonalityProfile {
    pub fn resolved(&self) -> ResolvedPersonality {
        let base = ResolvedPersonality::default();
        match self {
            PersonalityProfile::Default => base,
            PersonalityProfile::Derived(t) => ResolvedPersonality {
                tone: t.tone.clone().unwrap_or(base.tone),
                verbosity: t.verbosity.clone().unwrap_or(base.verbosity),
                humor: t.humor.unwrap_or(base.humor),
                interests: t.interests.clone(),
            },
        }
    }
}

/// 用户聚合记录（不含消息）
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub preferences: UserPreferences,
    #[serde(default)]
    pub personality: PersonalityProfile,
    #[serde(default)]
    pub current_topic: Option<String>,
}

fn default_language() -> String {
    "en".to_string()
}

impl Default for UserProfile {
    fn default() -> Self {
        Self::new(&default_language(), &default_timezone())
    }
}

impl UserProfile {
    pub fn new(language: &str, timezone: &str) -> Self {
        Self {
            language: language.to_string(),
            preferences: UserPreferences {
                timezone: timezone.to_string(),
                ..UserPreferences::default()
            },
            personality: PersonalityProfile::Default,
            current_topic: None,
        }
    }

    /// 回复语言：手动指定优先
    pub fn effective_language(&self) -> &str {
        self.preferences
            .custom_language
            .as_deref()
            .unwrap_or(&self.language)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_record_loads_with_defaults() {
        let p: UserProfile = serde_json::from_str(r#"{"preferences": {}}"#).unwrap();
        assert_eq!(p.language, "en");
        assert_eq!(p.preferences.timezone, "UTC");
        assert!(p.preferences.decorations);
        assert_eq!(p.personality, PersonalityProfile::Default);
    }

    #[test]
    fn test_custom_language_wins() {
        let mut p = UserProfile::new("tr", "Europe/Istanbul");
        assert_eq!(p.effective_language(), "tr");
        p.preferences.custom_language = Some("de".into());
        assert_eq!(p.effective_language(), "de");
    }

    #[test]
    fn test_derived_personality_fills_missing() {
        let profile = PersonalityProfile::Derived(PersonalityTraits {
            tone: Some("formal".into()),
            ..Default::default()
        });
        let r = profile.resolved();
        assert_eq!(r.tone, "formal");
        assert_eq!(r.verbosity, "balanced");
        assert!(r.humor);
    }

    #[test]
    fn test_personality_serde_tagged() {
        let json = serde_json::to_string(&PersonalityProfile::Derived(PersonalityTraits {
            humor: Some(false),
            ..Default::default()
        }))
        .unwrap();
        assert!(json.contains("\"kind\":\"derived\""));
        let back: PersonalityProfile = serde_json::from_str(&json).unwrap();
        assert!(!back.resolved().humor);
    }
}
