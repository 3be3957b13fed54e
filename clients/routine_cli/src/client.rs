use anyhow::Context;
use reqwest::{header, Client, Request, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

#[derive(Deserialize)]
struct Envelope<T> {
    ok: bool,
    data: Option<T>,
    #[serde(default)]
    error: Option<String>,
}

/// Thin JSON client for the routine core service.
pub struct CoreClient {
    client: Client,
    base_url: String,
}

impl CoreClient {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("build http client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> anyhow::Result<T> {
        let url = self.url(path);
        let res = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;
        unwrap_envelope(res).await
    }

    /// GET with `params` encoded into the query string.
    pub async fn get_query<Q: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        params: &Q,
    ) -> anyhow::Result<T> {
        let req = self.query_request(path, params)?;
        let url = req.url().to_string();
        let res = self
            .client
            .execute(req)
            .await
            .with_context(|| format!("GET {url}"))?;
        unwrap_envelope(res).await
    }

    fn query_request<Q: Serialize + ?Sized>(&self, path: &str, params: &Q) -> anyhow::Result<Request> {
        self.client
            .get(self.url(path))
            .query(params)
            .build()
            .with_context(|| format!("build GET {path}"))
    }

    pub async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> anyhow::Result<T> {
        let url = self.url(path);
        let res = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .with_context(|| format!("POST {url}"))?;
        unwrap_envelope(res).await
    }

    pub async fn post_raw<T: DeserializeOwned>(&self, path: &str, body: String) -> anyhow::Result<T> {
        let url = self.url(path);
        let res = self
            .client
            .post(&url)
            .header(header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .with_context(|| format!("POST {url}"))?;
        unwrap_envelope(res).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> anyhow::Result<T> {
        let url = self.url(path);
        let res = self
            .client
            .delete(&url)
            .send()
            .await
            .with_context(|| format!("DELETE {url}"))?;
        unwrap_envelope(res).await
    }

    /// Raw body of a non-envelope endpoint such as `/export`.
    pub async fn get_text(&self, path: &str) -> anyhow::Result<String> {
        let url = self.url(path);
        let res = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;
        if !res.status().is_success() {
            anyhow::bail!("http_{}", res.status().as_u16());
        }
        Ok(res.text().await?)
    }
}

async fn unwrap_envelope<T: DeserializeOwned>(res: Response) -> anyhow::Result<T> {
    let status = res.status();
    let body: Envelope<T> = res
        .json()
        .await
        .with_context(|| format!("unreadable response (http_{})", status.as_u16()))?;
    if !body.ok {
        anyhow::bail!(body.error.unwrap_or_else(|| format!("http_{}", status.as_u16())));
    }
    body.data.ok_or_else(|| anyhow::anyhow!("missing_data"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_params_are_url_encoded() {
        let c = CoreClient::new("http://127.0.0.1:17610/").unwrap();
        let req = c
            .query_request(
                "/routines",
                &[("q", "walk park"), ("filter", "a&b=c"), ("sort", "next")],
            )
            .unwrap();
        assert_eq!(req.url().path(), "/routines");
        assert_eq!(req.url().query(), Some("q=walk+park&filter=a%26b%3Dc&sort=next"));
    }
}
