//! Common test utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Result;
use image::{DynamicImage, Rgb, RgbImage};
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use reframe_image::{ImageFormat, encode};
use reframe_server::{FrontRouter, RouterConfig, Server, ServerConfig, TransformResponse};

/// A transform worker or front router running in the background.
pub struct TestServer {
    /// The server's address.
    pub addr: SocketAddr,
    /// HTTP client for this server.
    pub client: Client,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl TestServer {
    /// Start a worker with default configuration.
    pub async fn start() -> Result<Self> {
        Self::start_with(ServerConfig::new()).await
    }

    /// Start a worker with the given configuration; the bind address is
    /// replaced by a free local port.
    pub async fn start_with(config: ServerConfig) -> Result<Self> {
        let addr = find_available_port().await?;
        let server = Server::new(
            config
                .with_bind_address(addr)
                .with_request_logging(false),
        );

        let (tx, rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            let _ = server
                .run_until(addr, async {
                    let _ = rx.await;
                })
                .await;
        });

        Self::ready(addr, tx, handle).await
    }

    /// Start a front router over `workers`.
    pub async fn start_router(workers: Vec<SocketAddr>) -> Result<Self> {
        let addr = find_available_port().await?;
        let config = RouterConfig::new(addr, workers)
            .with_request_logging(false)
            .with_connect_timeout(Duration::from_millis(500))
            .with_health_timeout(Duration::from_millis(500));
        let router = FrontRouter::new(config)?;

        let (tx, rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            let _ = router
                .run_until(addr, async {
                    let _ = rx.await;
                })
                .await;
        });

        Self::ready(addr, tx, handle).await
    }

    async fn ready(
        addr: SocketAddr,
        shutdown: oneshot::Sender<()>,
        handle: JoinHandle<()>,
    ) -> Result<Self> {
        let client = Client::new();
        wait_for_server(&client, addr).await?;

        Ok(Self {
            addr,
            client,
            shutdown: Some(shutdown),
            handle,
        })
    }

    /// Stop the server and wait until its listener and connections are closed.
    pub async fn stop(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        timeout(Duration::from_secs(5), &mut self.handle).await??;
        Ok(())
    }

    /// Get the base URL for the server.
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.client.get(format!("{}{}", self.base_url(), path))
    }

    pub fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.client.post(format!("{}{}", self.base_url(), path))
    }

    /// Check if server is healthy.
    pub async fn health(&self) -> Result<bool> {
        let resp = self.get("/health").send().await?;
        Ok(resp.status().is_success())
    }

    /// Upload `file` and resize it, creating a new session.
    pub async fn upload(
        &self,
        file: Vec<u8>,
        file_name: &str,
        fields: &[(&str, &str)],
    ) -> Result<reqwest::Response> {
        let mut form = Form::new();
        for (name, value) in fields {
            form = form.text(name.to_string(), value.to_string());
        }
        let part = Part::bytes(file)
            .file_name(file_name.to_string())
            .mime_str(mime_for(file_name))?;
        form = form.part("image", part);

        Ok(self.post("/transform/resize").multipart(form).send().await?)
    }

    /// Upload a PNG and resize it to `width`; fails unless the server accepts it.
    pub async fn create_session(&self, png: Vec<u8>, width: u32) -> Result<TransformResponse> {
        let resp = self
            .upload(png, "image.png", &[("width", &width.to_string())])
            .await?;
        anyhow::ensure!(resp.status().is_success(), "upload failed: {}", resp.status());
        Ok(resp.json().await?)
    }

    /// POST a JSON body to a transform endpoint.
    pub async fn transform(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<reqwest::Response> {
        Ok(self.post(path).json(&body).send().await?)
    }
}

fn mime_for(file_name: &str) -> &'static str {
    if file_name.ends_with(".png") {
        "image/png"
    } else if file_name.ends_with(".jpg") {
        "image/jpeg"
    } else {
        "application/octet-stream"
    }
}

/// Encode a `width` x `height` PNG with a gradient, so orientation changes
/// are visible in the pixels.
pub fn png(width: u32, height: u32) -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    }));
    encode(&img, ImageFormat::Png).expect("encode test png")
}

/// Find an available port for a test server.
pub async fn find_available_port() -> Result<SocketAddr> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);
    Ok(addr)
}

/// Wait for the server to become ready.
async fn wait_for_server(client: &Client, addr: SocketAddr) -> Result<()> {
    let url = format!("http://{}/health", addr);

    let result = timeout(Duration::from_secs(5), async {
        loop {
            match client.get(&url).send().await {
                Ok(resp) if resp.status().is_success() => return Ok(()),
                _ => tokio::time::sleep(Duration::from_millis(50)).await,
            }
        }
    })
    .await;

    match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e),
        Err(_) => anyhow::bail!("Timeout waiting for server to start"),
    }
}
