use serde::{Deserialize, Serialize};

/// Model, product and company names plus bilingual topic terms.
pub const DEFAULT_KEYWORDS: &[&str] = &[
    "artificial intelligence",
    "machine learning",
    "deep learning",
    "neural network",
    "large language model",
    "language model",
    "LLM",
    "generative",
    "GPT",
    "ChatGPT",
    "OpenAI",
    "Anthropic",
    "Claude",
    "Gemini",
    "DeepMind",
    "Llama",
    "Mistral",
    "DeepSeek",
    "Qwen",
    "Copilot",
    "transformer",
    "diffusion",
    "multimodal",
    "AGI",
    "chatbot",
    "Hugging Face",
    "NVIDIA",
    "人工智能",
    "大模型",
    "大语言模型",
    "机器学习",
    "深度学习",
    "神经网络",
    "生成式",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelevanceConfig {
    pub keywords: Vec<String>,
}

impl Default for RelevanceConfig {
    fn default() -> Self {
        Self {
            keywords: DEFAULT_KEYWORDS.iter().map(|k| k.to_string()).collect(),
        }
    }
}

/// Keyword gate: an item is kept when any keyword occurs in its title or
/// summary, ignoring case.
#[derive(Debug, Clone)]
pub struct RelevanceFilter {
    keywords: Vec<String>,
}

impl RelevanceFilter {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keywords = keywords
            .into_iter()
            .map(|k| k.as_ref().trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        Self { keywords }
    }

    pub fn from_config(config: &RelevanceConfig) -> Self {
        Self::new(&config.keywords)
    }

    pub fn is_relevant(&self, title: &str, summary: &str) -> bool {
        self.matched_keyword(title, summary).is_some()
    }

    /// First keyword found, for logging why an item was kept.
    pub fn matched_keyword(&self, title: &str, summary: &str) -> Option<&str> {
        let haystack = format!("{} {}", title, summary).to_lowercase();
        self.keywords
            .iter()
            .find(|k| haystack.contains(k.as_str()))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.keywords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }
}

impl Default for RelevanceFilter {
    fn default() -> Self {
        Self::new(DEFAULT_KEYWORDS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_news_is_relevant() {
        let filter = RelevanceFilter::default();
        assert!(filter.is_relevant("New GPT model released", ""));
        assert!(!filter.is_relevant("Local bakery opens downtown", ""));
    }

    #[test]
    fn matches_case_insensitively_across_title_and_summary() {
        let filter = RelevanceFilter::default();
        assert_eq!(
            filter.matched_keyword("Quarterly results", "The company expands its OPENAI partnership"),
            Some("openai")
        );
        assert!(filter.is_relevant("国产大模型发布", ""));
        assert!(!filter.is_relevant("Mayor said the park reopens", "residents said thanks"));
    }

    #[test]
    fn custom_keywords_replace_defaults() {
        let filter = RelevanceFilter::from_config(&RelevanceConfig {
            keywords: vec!["  Robotics ".to_string(), "".to_string()],
        });
        assert_eq!(filter.len(), 1);
        assert!(filter.is_relevant("Warehouse robotics startup raises", ""));
        assert!(!filter.is_relevant("New GPT model released", ""));
    }

    #[test]
    fn empty_keyword_list_accepts_nothing() {
        let filter = RelevanceFilter::new(Vec::<String>::new());
        assert!(filter.is_empty());
        assert!(!filter.is_relevant("Anything at all", "about GPT"));
    }
}
