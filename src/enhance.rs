// src/enhance.rs
//
// Optional AI pass over the raw OCR text. The heuristic parse in
// `ingest` always runs; when an LLM backend is configured its output
// fills the gaps the regexes missed. Any failure on this path degrades
// back to the heuristic result, it never fails the caller.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::{LlmBackend, LlmSection};
use crate::error::LearnError;
use crate::ingest::{self, ExtractedInvoice};

const SYSTEM_PROMPT: &str = r#"You are an invoice data extraction assistant.
Given raw OCR text from a scanned purchase invoice, extract structured data and return ONLY valid JSON.

The JSON must match this schema exactly:
{
  "invoice_number": "string or null",
  "invoice_date": "string or null",
  "total_amount": number or null,
  "items": [
    {
      "description": "string",
      "quantity": number,
      "rate": number,
      "amount": number,
      "uom": "string or null"
    }
  ],
  "payment_terms": "string or null",
  "tax_info": {
    "gstin": "string or null",
    "cgst": number or null,
    "sgst": number or null,
    "igst": number or null
  }
}

Notes:
- The text may be garbled OCR output. Do your best to reconstruct the data.
- Use null for fields you cannot determine.
- Return ONLY the JSON object, no markdown fences, no commentary."#;

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f64,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// Resolved endpoint configuration ready to make API calls.
struct ResolvedEndpoint {
    base_url: String,
    model: String,
    api_key: String,
}

/// Resolve the LLM config section into a concrete endpoint.
fn resolve_endpoint(llm: &LlmSection) -> Result<ResolvedEndpoint, LearnError> {
    match llm.backend {
        LlmBackend::Ollama => {
            info!(
                url = %llm.ollama.base_url,
                model = %llm.ollama.model,
                "Using Ollama (local) backend"
            );
            Ok(ResolvedEndpoint {
                base_url: llm.ollama.base_url.clone(),
                model: llm.ollama.model.clone(),
                api_key: "ollama".to_string(), // required by API but ignored
            })
        }
        LlmBackend::Remote => {
            let api_key = std::env::var("LLM_API_KEY").map_err(|_| {
                LearnError::Enhancement("LLM_API_KEY env var required for remote backend".into())
            })?;
            info!(
                url = %llm.remote.base_url,
                model = %llm.remote.model,
                "Using remote API backend"
            );
            Ok(ResolvedEndpoint {
                base_url: llm.remote.base_url.clone(),
                model: llm.remote.model.clone(),
                api_key,
            })
        }
        LlmBackend::Disabled => Err(LearnError::Enhancement(
            "LLM enhancement is disabled".into(),
        )),
    }
}

/// Check if the Ollama server is reachable.
async fn check_ollama_health(client: &Client, base_url: &str) -> bool {
    // Ollama's health endpoint is at the root (not under /v1)
    let health_url = base_url.trim_end_matches("/v1").trim_end_matches("/v1/");

    match client
        .get(health_url)
        .timeout(std::time::Duration::from_secs(3))
        .send()
        .await
    {
        Ok(resp) => {
            if resp.status().is_success() {
                true
            } else {
                warn!(status = %resp.status(), "Ollama server returned non-OK status");
                false
            }
        }
        Err(e) => {
            warn!(error = %e, "Ollama server not reachable");
            false
        }
    }
}

async fn extract_with_llm(
    client: &Client,
    endpoint: &ResolvedEndpoint,
    ocr_text: &str,
) -> Result<ExtractedInvoice, LearnError> {
    // Truncate very long texts to stay within context limits
    let max_chars = 12_000;
    let text = if ocr_text.len() > max_chars {
        &ocr_text[..max_chars]
    } else {
        ocr_text
    };

    let request = ChatRequest {
        model: endpoint.model.clone(),
        messages: vec![
            ChatMessage {
                role: "system".to_string(),
                content: SYSTEM_PROMPT.to_string(),
            },
            ChatMessage {
                role: "user".to_string(),
                content: format!("Extract invoice data from the following OCR text:\n\n{text}"),
            },
        ],
        temperature: 0.0,
    };

    let url = format!("{}/chat/completions", endpoint.base_url);

    let response = client
        .post(&url)
        .header("Authorization", format!("Bearer {}", endpoint.api_key))
        .json(&request)
        .send()
        .await
        .map_err(|e| LearnError::Enhancement(e.to_string()))?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(LearnError::Enhancement(format!("LLM API error {status}: {body}")));
    }

    let chat_response: ChatResponse = response
        .json()
        .await
        .map_err(|e| LearnError::Enhancement(e.to_string()))?;
    let content = chat_response
        .choices
        .first()
        .map(|c| c.message.content.as_str())
        .ok_or_else(|| LearnError::Enhancement("Empty response from LLM".into()))?;

    // Strip markdown fences if the model added them despite instructions
    let json_str = content
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    // Some models prepend reasoning text; take just the JSON object.
    let json_str = extract_json_object(json_str)?;

    serde_json::from_str(json_str).map_err(|e| {
        LearnError::Enhancement(format!("Unparseable LLM response: {e}\nRaw: {json_str}"))
    })
}

/// Extract the outermost JSON object from a string that may contain
/// surrounding text (e.g. thinking tokens).
fn extract_json_object(s: &str) -> Result<&str, LearnError> {
    let start = s
        .find('{')
        .ok_or_else(|| LearnError::Enhancement("No '{' found in LLM response".into()))?;
    let end = s
        .rfind('}')
        .ok_or_else(|| LearnError::Enhancement("No '}' found in LLM response".into()))?;
    if end <= start {
        return Err(LearnError::Enhancement("Malformed JSON in LLM response".into()));
    }
    Ok(&s[start..=end])
}

/// Prefer LLM values, keep the heuristic answer wherever the model
/// returned null.
fn merge(llm: ExtractedInvoice, heuristic: ExtractedInvoice) -> ExtractedInvoice {
    ExtractedInvoice {
        invoice_number: llm.invoice_number.or(heuristic.invoice_number),
        invoice_date: llm.invoice_date.or(heuristic.invoice_date),
        total_amount: llm.total_amount.or(heuristic.total_amount),
        items: if llm.items.is_empty() { heuristic.items } else { llm.items },
        payment_terms: llm.payment_terms.or(heuristic.payment_terms),
        tax_info: if llm.tax_info.is_empty() { heuristic.tax_info } else { llm.tax_info },
    }
}

/// Parse the OCR text, enhanced by the configured LLM backend when one
/// is available. Always returns an invoice: enhancement failures fall
/// back to the pure heuristic parse.
pub async fn enhance_extraction(ocr_text: &str, llm: &LlmSection) -> ExtractedInvoice {
    let heuristic = ingest::extract(ocr_text);

    if llm.backend == LlmBackend::Disabled {
        return heuristic;
    }

    let endpoint = match resolve_endpoint(llm) {
        Ok(endpoint) => endpoint,
        Err(e) => {
            warn!(error = %e, "LLM backend unavailable, using heuristic extraction");
            return heuristic;
        }
    };

    let client = Client::new();
    if llm.backend == LlmBackend::Ollama && !check_ollama_health(&client, &endpoint.base_url).await
    {
        warn!("Ollama unreachable, using heuristic extraction");
        return heuristic;
    }

    match extract_with_llm(&client, &endpoint, ocr_text).await {
        Ok(enhanced) => {
            info!(
                invoice_number = ?enhanced.invoice_number,
                items = enhanced.items.len(),
                "LLM enhancement applied"
            );
            merge(enhanced, heuristic)
        }
        Err(e) => {
            warn!(error = %e, "LLM enhancement failed, using heuristic extraction");
            heuristic
        }
    }
}
