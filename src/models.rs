use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// Author as the rest of the crate sees it. The API sends either a bare
// username or a nested user object; both collapse into this on receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "AuthorWire")]
pub struct Author {
    pub id: Option<u64>,
    pub username: String,
    pub email: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AuthorWire {
    Name(String),
    User {
        #[serde(default)]
        id: Option<u64>,
        username: String,
        #[serde(default)]
        email: Option<String>,
    },
}

impl From<AuthorWire> for Author {
    fn from(wire: AuthorWire) -> Self {
        match wire {
            AuthorWire::Name(username) => Author {
                id: None,
                username,
                email: None,
            },
            AuthorWire::User {
                id,
                username,
                email,
            } => Author {
                id,
                username,
                email,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: u64,
    pub recipe: u64,
    pub author: Author,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DifficultyRating {
    pub id: u64,
    pub rating: u8,
    pub rating_author: Author,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipe {
    pub id: u64,
    pub title: String,
    pub description: String,
    pub ingredients: String,
    pub instructions: String,
    pub cooking_time: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub author: Author,
    #[serde(default)]
    pub comments: Vec<Comment>,
    #[serde(default)]
    pub comment_count: u32,
    #[serde(default)]
    pub average_difficulty: Option<f64>,
    #[serde(default)]
    pub user_rating: Option<u8>,
    #[serde(default)]
    pub difficulty_ratings: Option<Vec<DifficultyRating>>,
}

impl Recipe {
    // One ingredient per line, blank lines dropped
    pub fn ingredient_list(&self) -> Vec<&str> {
        self.ingredients
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect()
    }

    pub fn difficulty_summary(&self) -> String {
        match self.average_difficulty {
            Some(avg) if avg > 0.0 => format!("{avg:.1} on average of user ratings"),
            _ => "No ratings yet".to_string(),
        }
    }
}

// Writable recipe fields (create / update body)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipeInput {
    pub title: String,
    pub description: String,
    pub ingredients: String,
    pub instructions: String,
    pub cooking_time: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paginated<T> {
    pub count: u64,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

// Response of auth/user/. The backend sends `id`; dj-rest-auth's user
// serializer sends `pk`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountInfo {
    #[serde(alias = "pk")]
    pub id: u64,
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub is_staff: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessToken {
    pub access: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Credentials<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct Registration<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub password1: &'a str,
    pub password2: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefreshRequest<'a> {
    pub refresh: &'a str,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentBody {
    pub content: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RatingBody {
    pub rating: u8,
}
