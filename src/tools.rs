use serde::Serialize;
use serde_json::{Map, Value};

use crate::completion::{CompletionRequest, DEFAULT_MAX_TOKENS};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Business,
    Entertainment,
    Utility,
}

#[derive(Debug)]
pub struct Field {
    pub name: &'static str,
    pub label: &'static str,
    // used when the field is missing or blank
    pub placeholder: &'static str,
}

#[derive(Debug)]
pub enum InputShape {
    Text { max_chars: usize },
    Form {
        required: &'static str,
        fields: &'static [Field],
    },
}

#[derive(Debug)]
pub struct Tool {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub category: Category,
    pub system_prompt: &'static str,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub input: InputShape,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ToolInputError {
    #[error("request body must be a JSON object")]
    NotAnObject,

    #[error("`{0}` is required")]
    Missing(&'static str),

    #[error("`text` must be at most {max} characters")]
    TooLong { max: usize },
}

// GET /api/tools entry
#[derive(Debug, Serialize)]
pub struct ToolSummary {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub category: Category,
}

impl Tool {
    pub fn summary(&self) -> ToolSummary {
        ToolSummary {
            id: self.id,
            name: self.name,
            description: self.description,
            category: self.category,
        }
    }

    /// Validates `body` and builds the request for the completion service.
    pub fn build_request(&self, body: &Value) -> Result<CompletionRequest, ToolInputError> {
        let body = body.as_object().ok_or(ToolInputError::NotAnObject)?;

        let user_message = match &self.input {
            InputShape::Text { max_chars } => {
                let text = body
                    .get("text")
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .ok_or(ToolInputError::Missing("text"))?;
                if text.chars().count() > *max_chars {
                    return Err(ToolInputError::TooLong { max: *max_chars });
                }
                text.to_string()
            }
            InputShape::Form { required, fields } => {
                if form_value(body, required).is_none() {
                    return Err(ToolInputError::Missing(*required));
                }
                fields
                    .iter()
                    .map(|f| {
                        let value = form_value(body, f.name);
                        format!("{}: {}", f.label, value.as_deref().unwrap_or(f.placeholder))
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            }
        };

        let mut request = CompletionRequest::new(self.system_prompt, user_message);
        request.temperature = self.temperature;
        request.max_tokens = self.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS);
        Ok(request)
    }
}

// null, false, 0 and blank strings count as absent; other values render as JSON
fn form_value(body: &Map<String, Value>, name: &str) -> Option<String> {
    match body.get(name)? {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) if n.as_f64() == Some(0.0) => None,
        other => Some(other.to_string()),
    }
}

pub fn find(id: &str) -> Option<&'static Tool> {
    CATALOG.iter().find(|t| t.id == id)
}

pub fn catalog() -> &'static [Tool] {
    CATALOG
}

static CATALOG: &[Tool] = &[
    Tool {
        id: "mail-toxicity",
        name: "Email Toxicity Checker",
        description: "Scores how aggressive a business email reads before you hit send.",
        category: Category::Business,
        system_prompt: concat!(
            "You analyse the toxicity of business emails. Return JSON with: ",
            "toxicity_score (0-100), overall_tone, problems (array of {phrase, reason, severity}), ",
            "rewritten (a polite rewrite), advice. ",
            "Respond with a single valid JSON object and nothing else."
        ),
        temperature: 0.5,
        max_tokens: None,
        input: InputShape::Text { max_chars: 3000 },
    },
    Tool {
        id: "mail-true-meaning",
        name: "Email True Meaning Translator",
        description: "Translates polite business euphemisms into what the sender really means.",
        category: Category::Business,
        system_prompt: concat!(
            "You translate the hidden intent of business emails. Split the email into sentences and return JSON with: ",
            "translations (array of {original, true_meaning, honne_level 0-100}), overall_intent, danger_level. ",
            "Respond with a single valid JSON object and nothing else."
        ),
        temperature: 0.8,
        max_tokens: None,
        input: InputShape::Text { max_chars: 3000 },
    },
    Tool {
        id: "power-level",
        name: "Social Power Level",
        description: "Measures your social power level, scouter style.",
        category: Category::Entertainment,
        system_prompt: concat!(
            "You are a scouter measuring a person's social power level on a 1 to 100000 scale. ",
            "Return JSON with: power_level, rank, title, breakdown (array of {stat, value, comment}), ",
            "rival_character, comment. ",
            "Respond with a single valid JSON object and nothing else."
        ),
        temperature: 0.8,
        max_tokens: None,
        input: InputShape::Form {
            required: "job",
            fields: &[
                Field { name: "job", label: "Job", placeholder: "" },
                Field { name: "skills", label: "Skills", placeholder: "none in particular" },
                Field { name: "income", label: "Income bracket", placeholder: "not answered" },
                Field { name: "fitness", label: "Fitness (self-rated, of 5)", placeholder: "average" },
            ],
        },
    },
    Tool {
        id: "wikipedia",
        name: "If Wikipedia Wrote About You",
        description: "Turns your life story into an encyclopedia-style article.",
        category: Category::Entertainment,
        system_prompt: concat!(
            "You are an encyclopedia editor. Write a serious, encyclopedia-toned biography. ",
            "Return JSON with: article (markdown with sections), infobox (object of label to value), categories (array). ",
            "Respond with a single valid JSON object and nothing else."
        ),
        temperature: 0.8,
        max_tokens: Some(2048),
        input: InputShape::Form {
            required: "name",
            fields: &[
                Field { name: "name", label: "Name", placeholder: "" },
                Field { name: "career", label: "Career", placeholder: "unknown" },
                Field { name: "hobbies", label: "Hobbies and talents", placeholder: "unknown" },
                Field { name: "highlights", label: "Life highlights", placeholder: "unknown" },
            ],
        },
    },
    Tool {
        id: "prompt-checker",
        name: "Prompt Quality Checker",
        description: "Grades a prompt for a chat assistant and suggests improvements.",
        category: Category::Utility,
        system_prompt: concat!(
            "You are a prompt engineering expert. Evaluate the user's prompt. Return JSON with: ",
            "quality_score (0-100), grade (S/A/B/C/D), issues (array of {category, problem, suggestion}), ",
            "improved_prompt, summary. ",
            "Respond with a single valid JSON object and nothing else."
        ),
        temperature: 0.5,
        max_tokens: None,
        input: InputShape::Text { max_chars: 5000 },
    },
    Tool {
        id: "mounting",
        name: "One-Upmanship Translator",
        description: "Detects the hidden bragging in a conversation or post.",
        category: Category::Entertainment,
        system_prompt: concat!(
            "You detect hidden one-upmanship in conversations and social posts. Return JSON with: ",
            "mount_score (0-100), detections (array of {phrase, type, translation, severity}), ",
            "mount_type, counter_advice. ",
            "Respond with a single valid JSON object and nothing else."
        ),
        temperature: 0.8,
        max_tokens: None,
        input: InputShape::Text { max_chars: 3000 },
    },
    Tool {
        id: "edo-period",
        name: "Born in the Edo Period",
        description: "What would your modern skills have made you in the Edo period?",
        category: Category::Entertainment,
        system_prompt: concat!(
            "You are a historian of Edo-period Japan. Simulate the life the user would have led. Return JSON with: ",
            "edo_job, social_class, daily_life, income, life_story, famous_contemporary, survival_rating (1-5). ",
            "Respond with a single valid JSON object and nothing else."
        ),
        temperature: 0.8,
        max_tokens: Some(1500),
        input: InputShape::Form {
            required: "job",
            fields: &[
                Field { name: "job", label: "Current job", placeholder: "" },
                Field { name: "skills", label: "Skills", placeholder: "none in particular" },
                Field { name: "personality", label: "Personality", placeholder: "ordinary" },
            ],
        },
    },
    Tool {
        id: "mercari-listing",
        name: "Marketplace Listing Writer",
        description: "Writes a listing that sells, ready to paste.",
        category: Category::Utility,
        system_prompt: concat!(
            "You write second-hand marketplace listings that sell. Return JSON with: ",
            "title (at most 40 characters), description, suggested_price {min, max}, hashtags (array), tips (array). ",
            "Respond with a single valid JSON object and nothing else."
        ),
        temperature: 0.6,
        max_tokens: None,
        input: InputShape::Form {
            required: "product",
            fields: &[
                Field { name: "product", label: "Product", placeholder: "" },
                Field { name: "condition", label: "Condition", placeholder: "not stated" },
                Field { name: "details", label: "Details", placeholder: "none" },
            ],
        },
    },
    Tool {
        id: "goshugi",
        name: "Gift Money Advisor",
        description: "How much to give at a wedding, funeral or celebration.",
        category: Category::Utility,
        system_prompt: concat!(
            "You are an expert in Japanese ceremonial etiquette. Recommend the amount of gift money. Return JSON with: ",
            "amount (integer yen), amount_range {min, max}, reasoning, manner_tips (array), envelope_type, ",
            "writing_guide, regional_note, ng_amounts. ",
            "Respond with a single valid JSON object and nothing else."
        ),
        temperature: 0.3,
        max_tokens: None,
        input: InputShape::Form {
            required: "event",
            fields: &[
                Field { name: "event", label: "Event", placeholder: "" },
                Field { name: "relationship", label: "Relationship", placeholder: "not stated" },
                Field { name: "age", label: "Your age group", placeholder: "not stated" },
                Field { name: "region", label: "Region", placeholder: "not stated" },
            ],
        },
    },
];
