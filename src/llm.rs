//! Language-model client for listing generation.
//!
//! Defines the [`LanguageModel`] trait and two implementations:
//! - **[`DisabledModel`]** — used when `YANDEX_GPT_API_KEY` or
//!   `YANDEX_GPT_MODEL_URI` is missing; every call fails with
//!   [`ServiceError::NotConfigured`] naming the missing variables.
//! - **[`YandexGptClient`]** — calls the YandexGPT completion API.
//!
//! Use [`create_model`] to pick one from configuration.
//!
//! # Failure mapping
//!
//! | Situation | Error |
//! |-----------|-------|
//! | credentials absent | `NotConfigured` |
//! | timeout / connection failure | `Upstream("failed to reach YandexGPT: …")` |
//! | non-2xx status | `Upstream("YandexGPT API error <status>: <body>")` |
//! | undecodable body | `Upstream` |
//! | no alternative with text | `EmptyResponse` |
//!
//! There are no retries: a failed call surfaces immediately.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use crate::config::LlmConfig;
use crate::error::{ServiceError, ServiceResult};

/// Built-in system instruction used unless `YANDEX_GPT_SYSTEM_PROMPT` is set.
pub const DEFAULT_SYSTEM_PROMPT: &str = "Вы — профессиональный аналитик и копирайтер в сфере земельной недвижимости. \
Ваша задача — по сухому техническому описанию (площадь, цена, категория, кадастровый номер, \
локация, особенности участка) создавать структурированные и читаемые объявления для Авито.\n\n\
Формат и требования:\n\
1. Пиши в стиле экспертного каталога — чётко, уверенно, без рекламных клише и субъективных прилагательных.\n\
2. Структура текста:\n   \
- Заголовок: тип участка, площадь, цена, регион, ключевая особенность.\n   \
- Описание: первый абзац — образ места; второй — физические характеристики и сценарии освоения; \
третий — инвестиционный потенциал.\n   \
- Технические данные: площадь, кадастровый номер, категория, формат сделки, подъезд, коммуникации.\n   \
- Характер участка: рельеф, растительность, водоём, комфорт и приватность.\n   \
- Локация и окружение: расстояния до населённых пунктов, туристические точки, инфраструктура.\n   \
- Перспективы: динамика региона, транспортная доступность, драйверы роста стоимости.\n   \
- Инвестиционный ракурс: потенциальная доходность (глемпинг, туризм, апартаменты, фермерство и т.д.).\n   \
- Идеи использования: эко-усадьба, ретрит, туркомплекс, частная резиденция.\n   \
- Контакт: мягкий призыв написать или позвонить для получения плана и фото.\n\
3. Всегда подчёркивай инвестиционную ценность: редкость локации, природный ресурс, рост турпотока, развитие инфраструктуры.\n\
4. Избегай рекламных штампов вроде «уникальный», «великолепный», «лучшее предложение». Используй факты и последствия: \
«растёт интерес к локации», «земля сохраняет ликвидность», «рекреационный потенциал усиливается».\n\
5. Абзацы — по 2–3 предложения; ритм спокойный, без излишней поэтичности.\n\
6. Стиль — нейтрально-профессиональный, акцент на ценности земли как актива, а не на пейзажах.\n";

/// A text-completion backend.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Whether calls can succeed at all. The router answers `503` up front
    /// when this is `false`.
    fn is_configured(&self) -> bool;

    /// Fails with [`ServiceError::NotConfigured`] when calls cannot succeed.
    fn ensure_configured(&self) -> ServiceResult<()> {
        if self.is_configured() {
            Ok(())
        } else {
            Err(ServiceError::NotConfigured(
                "YandexGPT is not configured".to_string(),
            ))
        }
    }

    /// Sends `prompt` as the sole user turn and returns the completion text.
    async fn complete(&self, prompt: &str) -> ServiceResult<String>;
}

// ============ Disabled Model ============

/// Stand-in used when credentials are absent.
pub struct DisabledModel {
    missing: Vec<&'static str>,
}

impl DisabledModel {
    pub fn new(missing: Vec<&'static str>) -> Self {
        Self { missing }
    }

    fn message(&self) -> String {
        if self.missing.is_empty() {
            "YandexGPT is not configured".to_string()
        } else {
            format!(
                "YandexGPT is not configured: set {}",
                self.missing.join(", ")
            )
        }
    }
}

#[async_trait]
impl LanguageModel for DisabledModel {
    fn is_configured(&self) -> bool {
        false
    }

    fn ensure_configured(&self) -> ServiceResult<()> {
        Err(ServiceError::NotConfigured(self.message()))
    }

    async fn complete(&self, _prompt: &str) -> ServiceResult<String> {
        self.ensure_configured()?;
        Ok(String::new())
    }
}

// ============ YandexGPT ============

/// Client for the YandexGPT `foundationModels/v1/completion` endpoint.
pub struct YandexGptClient {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    model_uri: String,
    system_prompt: String,
    folder_id: Option<String>,
    temperature: f64,
    max_tokens: u32,
}

impl YandexGptClient {
    /// Builds a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the API key or model URI is missing, or if the
    /// HTTP client cannot be constructed.
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let credentials = &config.credentials;
        let api_key = credentials
            .api_key
            .clone()
            .ok_or_else(|| anyhow::anyhow!("{} not set", crate::config::ENV_API_KEY))?;
        let model_uri = credentials
            .model_uri
            .clone()
            .ok_or_else(|| anyhow::anyhow!("{} not set", crate::config::ENV_MODEL_URI))?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            api_url: config.api_url.clone(),
            api_key,
            model_uri,
            system_prompt: credentials
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            folder_id: credentials.folder_id.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    /// The JSON request body for `prompt`.
    pub fn request_body(&self, prompt: &str) -> Value {
        let mut body = json!({
            "modelUri": self.model_uri,
            "completionOptions": {
                "temperature": self.temperature,
                "maxTokens": self.max_tokens,
            },
            "messages": [
                { "role": "system", "text": self.system_prompt },
                { "role": "user", "text": prompt },
            ],
        });
        if let Some(folder_id) = &self.folder_id {
            body["folderId"] = Value::String(folder_id.clone());
        }
        body
    }
}

#[async_trait]
impl LanguageModel for YandexGptClient {
    fn is_configured(&self) -> bool {
        true
    }

    async fn complete(&self, prompt: &str) -> ServiceResult<String> {
        let body = self.request_body(prompt);

        let response = self
            .http
            .post(&self.api_url)
            .header("Content-Type", "application/json; charset=utf-8")
            .header("Authorization", format!("Api-Key {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, timeout = e.is_timeout(), "YandexGPT request failed");
                ServiceError::upstream(format!("failed to reach YandexGPT: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            tracing::warn!(%status, "YandexGPT returned an error status");
            return Err(ServiceError::upstream(format!(
                "YandexGPT API error {}: {}",
                status, body_text
            )));
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| ServiceError::upstream(format!("invalid YandexGPT response: {}", e)))?;

        parse_completion_response(&json)
    }
}

/// Returns the first alternative whose trimmed `message.text` is non-empty.
///
/// Alternatives are scanned strictly in the order the API returned them.
pub fn parse_completion_response(json: &Value) -> ServiceResult<String> {
    let alternatives = json
        .get("result")
        .and_then(|r| r.get("alternatives"))
        .and_then(|a| a.as_array())
        .map(Vec::as_slice)
        .unwrap_or_default();

    alternatives
        .iter()
        .filter_map(|alt| alt.get("message")?.get("text")?.as_str())
        .map(str::trim)
        .find(|text| !text.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ServiceError::EmptyResponse("YandexGPT returned an empty response".to_string()))
}

/// Creates the appropriate [`LanguageModel`] for the configuration.
///
/// Returns a [`DisabledModel`] when credentials are incomplete.
pub fn create_model(config: &LlmConfig) -> Result<Arc<dyn LanguageModel>> {
    if config.is_enabled() {
        Ok(Arc::new(YandexGptClient::new(config)?))
    } else {
        Ok(Arc::new(DisabledModel::new(config.missing_variables())))
    }
}
