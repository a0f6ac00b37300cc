//! Model Router: the understanding engine. Sends the rendered catalog and the utterance to an
//! OpenAI-compatible chat endpoint (live), or runs a keyword parser that answers in the same
//! JSON shape (mock).

use nimbus_core::{
    build_instruction, build_validation_instruction, CoreConfig, OperationCatalog,
    UnderstandingEngine, SYSTEM_PROMPT,
};
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Map, Value};

const ENGINE_NAME: &str = "ModelRouter";
const ENV_LLM_API_URL: &str = "NIMBUS_LLM_API_URL";
const ENV_LLM_API_KEY: &str = "NIMBUS_LLM_API_KEY";
const DEFAULT_API_URL: &str = "https://api.openai.com/v1";
const VALIDATION_SYSTEM_PROMPT: &str = "You review a generated cloud operation call against \
the request it came from. Reply with JSON only, no commentary.";

type EngineError = Box<dyn std::error::Error + Send + Sync>;

/// Words that follow a noun ("server named x") but are never a resource reference.
const STOPWORDS: &[&str] = &[
    "named", "called", "with", "to", "from", "for", "and", "using", "of", "the", "a", "an", "on",
    "in", "size", "image", "flavor", "all", "project", "my",
];

/// Mode for LLM invocation: mock (local keyword parser) or live (external API).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LlmMode {
    #[default]
    Mock,
    Live,
}

impl LlmMode {
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("live") {
            LlmMode::Live
        } else {
            LlmMode::Mock
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LlmMode::Mock => "mock",
            LlmMode::Live => "live",
        }
    }
}

struct MockPatterns {
    name: Regex,
    image: Regex,
    flavor: Regex,
    size: Regex,
    cidr: Regex,
    device: Regex,
    server_ref: Regex,
    volume_ref: Regex,
    network_ref: Regex,
    verb_target: Regex,
    to_target: Regex,
    from_target: Regex,
    for_target: Regex,
}

impl MockPatterns {
    fn compile() -> Result<Self, regex::Error> {
        const IDENT: &str = r#"["']?([A-Za-z0-9][\w.-]*)"#;
        let with_ident = |prefix: &str| Regex::new(&format!("{}{}", prefix, IDENT));
        Ok(Self {
            name: with_ident(r"(?i)\b(?:named|called)\s+")?,
            image: Regex::new(r"(?i)\b(ubuntu|centos|debian)[\s-]*(\d+(?:\.\d+)?)")?,
            flavor: Regex::new(r"(?i)\b(m1\.(?:tiny|small|medium|large|xlarge))\b")?,
            size: Regex::new(r"(?i)\b(\d+)\s*(?:gb|gib|g)\b")?,
            cidr: Regex::new(r"\b(\d{1,3}(?:\.\d{1,3}){3}/\d{1,2})\b")?,
            device: Regex::new(r"(/dev/[a-z0-9]+)")?,
            server_ref: with_ident(r"(?i)\b(?:server|vm|instance)\s+")?,
            volume_ref: with_ident(r"(?i)\bvolume\s+")?,
            network_ref: with_ident(r"(?i)\bnetwork\s+")?,
            verb_target: with_ident(
                r"(?i)\b(?:resize|upgrade|downgrade|scale|delete|remove|destroy|terminate|show|describe)\s+(?:the\s+)?(?:server\s+|vm\s+|instance\s+|volume\s+|network\s+)?",
            )?,
            to_target: with_ident(r"(?i)\bto\s+(?:the\s+)?(?:server\s+|vm\s+|instance\s+)?")?,
            from_target: with_ident(r"(?i)\bfrom\s+(?:the\s+)?(?:server\s+|vm\s+|instance\s+)?")?,
            for_target: with_ident(r"(?i)\bfor\s+(?:server\s+|vm\s+|instance\s+)?")?,
        })
    }
}

/// First capture of `re` in `text` that is not a stopword.
fn reference(re: &Regex, text: &str) -> Option<String> {
    re.captures_iter(text)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
        .find(|s| !STOPWORDS.contains(&s.to_ascii_lowercase().as_str()))
}

fn canonical_image(distro: &str, version: &str) -> String {
    let distro = match distro.to_ascii_lowercase().as_str() {
        "ubuntu" => "Ubuntu",
        "centos" => "CentOS",
        _ => "Debian",
    };
    format!("{}-{}", distro, version)
}

/// Routes an utterance to a mock parser or a live chat-completions API.
pub struct ModelRouter {
    mode: LlmMode,
    model: String,
    client: reqwest::Client,
    patterns: MockPatterns,
}

impl ModelRouter {
    pub fn new(mode: LlmMode, model: impl Into<String>) -> Result<Self, regex::Error> {
        Ok(Self {
            mode,
            model: model.into(),
            client: reqwest::Client::new(),
            patterns: MockPatterns::compile()?,
        })
    }

    pub fn from_config(config: &CoreConfig) -> Result<Self, regex::Error> {
        Self::new(LlmMode::parse(&config.llm_mode), config.llm_model.clone())
    }

    pub fn mode(&self) -> LlmMode {
        self.mode
    }

    /// Mock LLM: keyword rules producing `{"function_name", "parameters"}` or `clarify`.
    fn mock_generate(&self, utterance: &str) -> String {
        let (operation, parameters) = self.mock_parse(utterance);
        json!({"function_name": operation, "parameters": parameters}).to_string()
    }

    fn mock_parse(&self, text: &str) -> (&'static str, Map<String, Value>) {
        let p = &self.patterns;
        let lower = text.to_lowercase();
        let words: Vec<&str> = lower
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        let has = |options: &[&str]| options.iter().any(|o| words.contains(o));

        let volume = has(&["volume", "volumes", "disk", "disks"]);
        let network = has(&["network", "networks"]);
        let server = has(&["server", "servers", "vm", "vms", "instance", "instances"]);

        let mut params = Map::new();
        let mut set = |key: &str, value: Option<Value>| {
            if let Some(v) = value {
                params.insert(key.to_string(), v);
            }
        };
        let text_ref = |re: &Regex| reference(re, text).map(Value::String);
        let server_target = || {
            reference(&p.server_ref, text)
                .or_else(|| reference(&p.name, text))
                .or_else(|| reference(&p.verb_target, text))
                .map(Value::String)
        };

        let operation = if has(&["attach"]) {
            set(
                "server_id_or_name",
                text_ref(&p.to_target).or_else(|| text_ref(&p.server_ref)),
            );
            set("volume_id_or_name", text_ref(&p.volume_ref));
            set("device", text_ref(&p.device));
            "attach_volume"
        } else if has(&["detach"]) {
            set(
                "server_id_or_name",
                text_ref(&p.from_target).or_else(|| text_ref(&p.server_ref)),
            );
            set("volume_id_or_name", text_ref(&p.volume_ref));
            "detach_volume"
        } else if has(&["usage", "quota", "consumption"]) {
            set("identifier", text_ref(&p.for_target));
            "get_usage"
        } else if has(&["resize", "upgrade", "downgrade", "scale"]) {
            set("server_id_or_name", server_target());
            set("flavor_name", text_ref(&p.flavor));
            "resize_server"
        } else if has(&["delete", "remove", "destroy", "terminate"]) {
            if volume {
                set(
                    "volume_id_or_name",
                    text_ref(&p.volume_ref).or_else(|| text_ref(&p.verb_target)),
                );
                "delete_volume"
            } else if network {
                set(
                    "network_id_or_name",
                    text_ref(&p.network_ref).or_else(|| text_ref(&p.verb_target)),
                );
                "delete_network"
            } else {
                set("server_id_or_name", server_target());
                "delete_server"
            }
        } else if has(&["create", "make", "launch", "provision", "add", "new", "spin", "build", "deploy", "boot"]) {
            let size = p
                .size
                .captures(text)
                .and_then(|c| c.get(1))
                .and_then(|m| m.as_str().parse::<i64>().ok())
                .map(Value::from);
            if server || p.image.is_match(text) {
                set(
                    "name",
                    text_ref(&p.name).or_else(|| text_ref(&p.server_ref)),
                );
                set(
                    "image_name",
                    p.image
                        .captures(text)
                        .map(|c| Value::String(canonical_image(&c[1], &c[2]))),
                );
                set("flavor_name", text_ref(&p.flavor));
                set("volume_size", size);
                "create_server"
            } else if volume {
                set(
                    "name",
                    text_ref(&p.name).or_else(|| text_ref(&p.volume_ref)),
                );
                set("size_gb", size);
                "create_volume"
            } else if network {
                set(
                    "network_name",
                    text_ref(&p.name).or_else(|| text_ref(&p.network_ref)),
                );
                set("subnet_cidr", text_ref(&p.cidr));
                "create_network"
            } else {
                "clarify"
            }
        } else if server && has(&["details", "detail", "describe", "info", "status", "show"])
            && server_target().is_some()
            && !has(&["servers", "vms", "instances"])
        {
            set("server_id_or_name", server_target());
            "get_server_details"
        } else if server {
            "list_servers"
        } else if has(&["image", "images"]) {
            "list_images"
        } else if has(&["flavor", "flavors", "sizes"]) {
            "list_flavors"
        } else if network {
            "list_networks"
        } else if volume {
            "list_volumes"
        } else {
            "clarify"
        };
        drop(set);
        (operation, params)
    }

    /// Live chat-completions call. Fails when no API key is configured.
    async fn live_chat(&self, system: &str, user: String) -> Result<String, EngineError> {
        let base =
            std::env::var(ENV_LLM_API_URL).unwrap_or_else(|_| DEFAULT_API_URL.to_string());
        let key = std::env::var(ENV_LLM_API_KEY)
            .map_err(|_| format!("{} is not set; cannot use live mode", ENV_LLM_API_KEY))?;

        let body = json!({
            "model": &self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user}
            ],
            "temperature": 0.1
        });
        let response = self
            .client
            .post(format!("{}/chat/completions", base.trim_end_matches('/')))
            .bearer_auth(key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(format!("LLM API error {}: {}", status, text).into());
        }

        #[derive(Deserialize)]
        struct Message {
            content: String,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: Message,
        }
        #[derive(Deserialize)]
        struct ApiResponse {
            choices: Vec<Choice>,
        }

        let parsed: ApiResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| "LLM API returned no choices".into())
    }
}

#[async_trait::async_trait]
impl UnderstandingEngine for ModelRouter {
    fn name(&self) -> &str {
        ENGINE_NAME
    }

    async fn interpret(
        &self,
        utterance: &str,
        catalog: &OperationCatalog,
    ) -> Result<String, EngineError> {
        tracing::debug!(target: "nimbus::engine", mode = self.mode.as_str(), utterance, "interpreting");
        match self.mode {
            LlmMode::Mock => Ok(self.mock_generate(utterance)),
            LlmMode::Live => {
                self.live_chat(SYSTEM_PROMPT, build_instruction(catalog, utterance))
                    .await
            }
        }
    }

    /// The keyword parser has nothing to add on a second pass; live mode asks the model.
    async fn validate(
        &self,
        utterance: &str,
        operation: &str,
        arguments: &Map<String, Value>,
        catalog: &OperationCatalog,
    ) -> Result<Option<String>, EngineError> {
        match self.mode {
            LlmMode::Mock => Ok(None),
            LlmMode::Live => {
                let instruction =
                    build_validation_instruction(catalog, utterance, operation, arguments);
                self.live_chat(VALIDATION_SYSTEM_PROMPT, instruction)
                    .await
                    .map(Some)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> (String, Value) {
        let router = ModelRouter::new(LlmMode::Mock, "test").unwrap();
        let raw: Value = serde_json::from_str(&router.mock_generate(text)).unwrap();
        (
            raw["function_name"].as_str().unwrap().to_string(),
            raw["parameters"].clone(),
        )
    }

    #[test]
    fn mock_parses_create_server_sentence() {
        let (op, params) =
            parse("create a server named web-1 with 15GB volume and Ubuntu 22.04 on m1.large");
        assert_eq!(op, "create_server");
        assert_eq!(params["name"], "web-1");
        assert_eq!(params["image_name"], "Ubuntu-22.04");
        assert_eq!(params["flavor_name"], "m1.large");
        assert_eq!(params["volume_size"], 15);
    }

    #[test]
    fn mock_handles_list_delete_and_clarify() {
        assert_eq!(parse("list all servers").0, "list_servers");
        let (op, params) = parse("delete server vm-123");
        assert_eq!(op, "delete_server");
        assert_eq!(params["server_id_or_name"], "vm-123");
        let (op, params) = parse("create a server");
        assert_eq!(op, "create_server");
        assert!(params.as_object().unwrap().is_empty());
        assert_eq!(parse("good morning").0, "clarify");
    }

    #[test]
    fn mock_parses_volume_and_network_operations() {
        let (op, params) = parse("attach volume data to server web-1 as /dev/vdc");
        assert_eq!(op, "attach_volume");
        assert_eq!(params["server_id_or_name"], "web-1");
        assert_eq!(params["volume_id_or_name"], "data");
        assert_eq!(params["device"], "/dev/vdc");

        let (op, params) = parse("create network lab-net with 10.20.0.0/16");
        assert_eq!(op, "create_network");
        assert_eq!(params["network_name"], "lab-net");
        assert_eq!(params["subnet_cidr"], "10.20.0.0/16");

        let (op, params) = parse("resize web-1 to m1.xlarge");
        assert_eq!(op, "resize_server");
        assert_eq!(params["server_id_or_name"], "web-1");

        let (op, params) = parse("show usage for the project");
        assert_eq!(op, "get_usage");
        assert!(params.get("identifier").is_none());
    }

    #[tokio::test]
    async fn live_mode_without_key_fails_cleanly() {
        std::env::remove_var(ENV_LLM_API_KEY);
        let router = ModelRouter::new(LlmMode::Live, "gpt-4o-mini").unwrap();
        let err = router
            .interpret("list servers", &OperationCatalog::standard())
            .await
            .unwrap_err();
        assert!(err.to_string().contains(ENV_LLM_API_KEY));
    }

    #[tokio::test]
    async fn mock_mode_skips_the_validation_pass() {
        let router = ModelRouter::new(LlmMode::Mock, "test").unwrap();
        let verdict = router
            .validate("list servers", "list_servers", &Map::new(), &OperationCatalog::standard())
            .await
            .unwrap();
        assert!(verdict.is_none());
    }
}
