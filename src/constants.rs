pub const WELCOME_MESSAGE: &str = "Welcome to the AI Trip Recommender API!";

pub const DEFAULT_PROMPT_NAME: &str = "ai-trip-recommender";
pub const DEFAULT_PROMPTLAYER_HOST: &str = "https://api.promptlayer.com";
pub const DEFAULT_OPENAI_HOST: &str = "https://api.openai.com";

pub const DEFAULT_DESTINATION: &str = "New York";
pub const DEFAULT_DURATION: &str = "1 week";
pub const DEFAULT_PREFERENCES: &str = "adventure, food, sightseeing";
pub const DEFAULT_USER_ID: &str = "guest";

/// Tags attached to every request logged in PromptLayer.
pub const REQUEST_TAGS: [&str; 2] = ["web-app", "lambda-api"];

pub const MISSING_PARAMETERS: &str = "Missing required parameters";

/// Score when the itinerary mentions the destination verbatim.
pub const FULL_SCORE: u8 = 100;
pub const PARTIAL_SCORE: u8 = 50;
