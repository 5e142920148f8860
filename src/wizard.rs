//! Agent configuration wizard: the option catalog, step rules, and the
//! documentation each choice pulls into the generator's search context.

use crate::markup::TagMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Normalise a label for lenient matching: lowercase alphanumerics only
fn normalize(label: &str) -> String {
    label
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Unrecognised catalog label
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownChoice(pub String);

impl fmt::Display for UnknownChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown choice '{}'", self.0)
    }
}

impl std::error::Error for UnknownChoice {}

/// Declares a catalog enum with its canonical label, accepted spellings, and
/// documentation URLs.
macro_rules! catalog_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $variant:ident => $label:literal, [$($alias:literal),*], [$($doc:literal),*]; )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant,)+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant,)+];

            /// Canonical label, as used in prompts and recommendations
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $label,)+
                }
            }

            /// Documentation the generator should be allowed to search
            pub fn docs(&self) -> &'static [&'static str] {
                match self {
                    $($name::$variant => &[$($doc),*],)+
                }
            }

            /// Every option with its documentation, in catalog order
            pub fn entries() -> Vec<CatalogEntry> {
                Self::ALL
                    .iter()
                    .map(|choice| CatalogEntry {
                        label: choice.as_str(),
                        docs: choice.docs(),
                    })
                    .collect()
            }
        }

        impl FromStr for $name {
            type Err = UnknownChoice;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let wanted = normalize(s);
                $(
                    if wanted == normalize($label) $(|| wanted == $alias)* {
                        return Ok($name::$variant);
                    }
                )+
                Err(UnknownChoice(s.to_string()))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

catalog_enum! {
    /// Single agent or a team of agents
    Approach {
        Single => "Single_Agent", ["single"], [];
        Multi => "Multi_Agent", ["multi"], [];
    }
}

catalog_enum! {
    /// Agent framework
    Framework {
        Langchain => "Langchain", [], [
            "https://python.langchain.com/docs/introduction/",
            "https://python.langchain.com/api_reference/",
            "https://github.com/langchain-ai/langchain/tree/master/cookbook"
        ];
        LlamaIndex => "LlamaIndex", [], [
            "https://docs.llamaindex.ai/en/stable/",
            "https://docs.llamaindex.ai/en/stable/api_reference/",
            "https://docs.llamaindex.ai/en/stable/examples/"
        ];
        CrewAi => "CrewAI", [], [
            "https://docs.crewai.com/api-reference/introduction",
            "https://docs.crewai.com/introduction",
            "https://github.com/crewAIInc/crewAI-examples"
        ];
        Langgraph => "Langgraph", [], [
            "https://langchain-ai.github.io/langgraph/",
            "https://langchain-ai.github.io/langgraph/reference/",
            "https://github.com/langchain-ai/langgraph/tree/main/docs/docs/tutorials"
        ];
    }
}

catalog_enum! {
    /// LLM provider the generated agent will call
    ProviderChoice {
        Gemini => "Gemini", [], ["https://firebase.google.com/docs/ai-logic/models"];
        Groq => "Groq", [], ["https://console.groq.com/docs"];
        Deepseek => "Deepseek", [], ["https://api-docs.deepseek.com/api/deepseek-api"];
        Perplexity => "Perplexity", [], ["https://docs.perplexity.ai/home"];
        OpenAi => "OpenAI", [], ["https://platform.openai.com/docs/api-reference/introduction"];
        Claude => "Claude", ["anthropic"], ["https://docs.anthropic.com/en/api/overview"];
        Ollama => "Ollama", [], ["https://github.com/ollama/ollama/blob/main/docs/api.md"];
    }
}

catalog_enum! {
    /// Where the agent gets its knowledge from
    ToolUse {
        Rag => "RAG", [], [];
        Websurf => "Websurf", ["websearch"], [];
        Both => "Both", [], [];
    }
}

catalog_enum! {
    /// Embedding model family
    Embedder {
        Huggingface => "Huggingface", [], [];
        Gemini => "Gemini", [], [];
        OpenAi => "OpenAI", [], [];
    }
}

catalog_enum! {
    /// Vector database
    VectorDb {
        Chroma => "Chroma", ["chromadb"], [];
        Faiss => "FAISS", [], [];
        Pinecone => "Pinecone", ["pineconedb"], ["https://docs.pinecone.io/reference/api/introduction"];
        Weaviate => "Weaviate", ["weaviatedb"], ["https://weaviate.io/developers/weaviate/api"];
    }
}

/// Choices collected by the wizard, exactly as the UI sends them
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WizardConfig {
    pub approach: String,
    pub framework: String,
    pub llm_provider: String,
    pub tool_use: String,
    pub embedder: String,
    pub vector_db: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_urls: Option<Vec<String>>,
}

impl WizardConfig {
    pub fn approach(&self) -> Option<Approach> {
        self.approach.parse().ok()
    }

    pub fn framework(&self) -> Option<Framework> {
        self.framework.parse().ok()
    }

    pub fn provider(&self) -> Option<ProviderChoice> {
        self.llm_provider.parse().ok()
    }

    pub fn tool_use(&self) -> Option<ToolUse> {
        self.tool_use.parse().ok()
    }

    pub fn embedder(&self) -> Option<Embedder> {
        self.embedder.parse().ok()
    }

    pub fn vector_db(&self) -> Option<VectorDb> {
        self.vector_db.parse().ok()
    }

    /// Fields (camelCase) that are still empty
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("approach", &self.approach),
            ("framework", &self.framework),
            ("llmProvider", &self.llm_provider),
            ("toolUse", &self.tool_use),
            ("embedder", &self.embedder),
            ("vectorDb", &self.vector_db),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.missing_fields().is_empty()
    }

    /// Documentation URLs for the selected framework, provider and database
    fn catalog_docs(&self) -> Vec<String> {
        let mut urls: Vec<String> = Vec::new();
        let docs = self
            .framework()
            .map(|f| f.docs())
            .into_iter()
            .chain(self.provider().map(|p| p.docs()))
            .chain(self.vector_db().map(|d| d.docs()))
            .flatten();

        for url in docs {
            if !urls.iter().any(|u| u == url) {
                urls.push(url.to_string());
            }
        }
        urls
    }

    /// Documentation URLs for the selected framework, provider and database,
    /// followed by any custom URLs. Order is kept and duplicates dropped.
    pub fn search_context(&self) -> Vec<String> {
        let mut urls = self.catalog_docs();
        for url in self.custom_urls.iter().flatten() {
            if !urls.contains(url) {
                urls.push(url.clone());
            }
        }
        urls
    }

    /// [`search_context`](Self::search_context) bounded to `max` entries.
    ///
    /// The stack's documentation is kept first; custom URLs only fill the
    /// room left after it, most recent ones kept.
    pub fn grounding_urls(&self, max: usize) -> Vec<String> {
        let mut urls = self.catalog_docs();
        urls.truncate(max);

        let custom: Vec<String> =
            sanitize_context_urls(self.custom_urls.as_deref().unwrap_or_default(), usize::MAX)
                .into_iter()
                .filter(|url| !urls.contains(url))
                .collect();
        let skip = custom.len().saturating_sub(max - urls.len());
        urls.extend(custom.into_iter().skip(skip));
        urls
    }

    /// The choices as the JSON block the code builder prompt expects.
    /// Recognised choices use their canonical label; anything else is passed
    /// through untouched.
    pub fn tech_stack(&self) -> String {
        fn label<T: fmt::Display>(parsed: Option<T>, raw: &str) -> String {
            parsed.map(|p| p.to_string()).unwrap_or_else(|| raw.trim().to_string())
        }

        let mut stack = BTreeMap::new();
        stack.insert("approach", label(self.approach(), &self.approach));
        stack.insert("framework", label(self.framework(), &self.framework));
        stack.insert("LLM_provider", label(self.provider(), &self.llm_provider));
        stack.insert("Tool_use", label(self.tool_use(), &self.tool_use));
        stack.insert("Embedder", label(self.embedder(), &self.embedder));
        stack.insert("Database_used", label(self.vector_db(), &self.vector_db));

        serde_json::to_string_pretty(&stack).unwrap_or_default()
    }
}

/// The wizard's steps, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum WizardStep {
    Approach = 1,
    Framework = 2,
    Provider = 3,
    Tools = 4,
    Storage = 5,
    Name = 6,
    Prompt = 7,
}

impl WizardStep {
    pub const ALL: [WizardStep; 7] = [
        WizardStep::Approach,
        WizardStep::Framework,
        WizardStep::Provider,
        WizardStep::Tools,
        WizardStep::Storage,
        WizardStep::Name,
        WizardStep::Prompt,
    ];

    pub fn from_number(number: u8) -> Option<Self> {
        Self::ALL.get(usize::from(number).checked_sub(1)?).copied()
    }

    pub fn number(self) -> u8 {
        self as u8
    }

    pub fn label(self) -> &'static str {
        match self {
            WizardStep::Approach => "approach",
            WizardStep::Framework => "framework",
            WizardStep::Provider => "provider",
            WizardStep::Tools => "tools",
            WizardStep::Storage => "database",
            WizardStep::Name => "name",
            WizardStep::Prompt => "prompt",
        }
    }

    pub fn next(self) -> Option<Self> {
        Self::from_number(self.number() + 1)
    }

    pub fn previous(self) -> Option<Self> {
        Self::from_number(self.number().checked_sub(1)?)
    }

    /// Whether the user filled in what this step asks for
    pub fn can_proceed(self, config: &WizardConfig, name: &str, prompt: &str) -> bool {
        let filled = |value: &str| !value.trim().is_empty();
        match self {
            WizardStep::Approach => filled(&config.approach),
            WizardStep::Framework => filled(&config.framework),
            WizardStep::Provider => filled(&config.llm_provider),
            WizardStep::Tools => filled(&config.tool_use),
            WizardStep::Storage => filled(&config.embedder) && filled(&config.vector_db),
            WizardStep::Name => filled(name),
            WizardStep::Prompt => filled(prompt),
        }
    }

    /// First step that is not satisfied, if any
    pub fn first_incomplete(config: &WizardConfig, name: &str, prompt: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|step| !step.can_proceed(config, name, prompt))
    }
}

/// One selectable option and the documentation it grounds generation on
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogEntry {
    pub label: &'static str,
    pub docs: &'static [&'static str],
}

/// Every option the wizard offers, for the UI to render
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WizardCatalog {
    pub approaches: Vec<CatalogEntry>,
    pub frameworks: Vec<CatalogEntry>,
    pub llm_providers: Vec<CatalogEntry>,
    pub tool_uses: Vec<CatalogEntry>,
    pub embedders: Vec<CatalogEntry>,
    pub vector_dbs: Vec<CatalogEntry>,
    pub steps: Vec<&'static str>,
}

impl WizardCatalog {
    pub fn build() -> Self {
        Self {
            approaches: Approach::entries(),
            frameworks: Framework::entries(),
            llm_providers: ProviderChoice::entries(),
            tool_uses: ToolUse::entries(),
            embedders: Embedder::entries(),
            vector_dbs: VectorDb::entries(),
            steps: WizardStep::ALL.iter().map(|s| s.label()).collect(),
        }
    }
}

/// Configuration recommendations scraped from the recommender's answer
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Recommendations {
    /// Recommended values keyed by tag (`framework`, `LLM_provider`, …)
    pub options: BTreeMap<String, String>,
    /// One-line reasons keyed by tag (`framework_justification`, …)
    pub justifications: BTreeMap<String, String>,
}

impl Recommendations {
    pub fn from_tags(tags: TagMap) -> Self {
        let (justifications, options) = tags
            .into_iter()
            .partition(|(key, _)| key.to_lowercase().contains("justification"));
        Self {
            options,
            justifications,
        }
    }

    fn option(&self, key: &str) -> String {
        self.options
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.clone())
            .unwrap_or_default()
    }

    /// The recommendation expressed as wizard choices
    pub fn suggested_config(&self) -> WizardConfig {
        WizardConfig {
            approach: self.option("approach"),
            framework: self.option("framework"),
            llm_provider: self.option("LLM_provider"),
            tool_use: self.option("Tool_use"),
            embedder: self.option("Embedder"),
            vector_db: self.option("Database_used"),
            custom_urls: None,
        }
    }
}

/// Keep absolute http(s) URLs only, drop duplicates, and keep the most recent
/// `max` entries.
pub fn sanitize_context_urls(urls: &[String], max: usize) -> Vec<String> {
    let mut kept: Vec<String> = Vec::new();

    for raw in urls {
        let candidate = raw.trim();
        let valid = url::Url::parse(candidate)
            .map(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
            .unwrap_or(false);

        if !valid {
            tracing::debug!("Dropping invalid context URL: {}", candidate);
            continue;
        }
        if !kept.iter().any(|k| k == candidate) {
            kept.push(candidate.to_string());
        }
    }

    if kept.len() > max {
        kept.drain(..kept.len() - max);
    }
    kept
}
