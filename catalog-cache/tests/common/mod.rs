use std::net::SocketAddr;
use std::sync::Arc;

use reqwest::header::ACCEPT_LANGUAGE;
use tokio::net::TcpListener;
use tokio::sync::Notify;

use catalog_cache::catalog::Catalog;
use catalog_cache::config::DEFAULT_TEST_CONFIG;
use catalog_cache::server::serve_catalog;
use catalog_cache::test_utils::{category_record, tool_record, InMemoryStore};

pub struct ServerHandle {
    pub addr: SocketAddr,
    shutdown: Arc<Notify>,
}

impl ServerHandle {
    pub async fn for_catalog(catalog: Arc<Catalog>) -> ServerHandle {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let notify = Arc::new(Notify::new());
        let shutdown = notify.clone();
        let config = DEFAULT_TEST_CONFIG.clone();

        tokio::spawn(async move {
            serve_catalog(catalog, config, listener, async move {
                notify.notified().await
            })
            .await
        });
        ServerHandle { addr, shutdown }
    }

    pub async fn get(&self, path: &str, lang: Option<&str>) -> reqwest::Response {
        let client = reqwest::Client::new();
        let mut request = client.get(format!("http://{:?}{}", self.addr, path));
        if let Some(lang) = lang {
            request = request.header(ACCEPT_LANGUAGE, lang);
        }
        request.send().await.expect("failed to send request")
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.shutdown.notify_one()
    }
}

/// Two categories, one featured tool and one plain tool.
pub fn seeded_store() -> Arc<InMemoryStore> {
    let chat = category_record(1, "chat", &[("ru", "Чат"), ("en", "Chat")]);
    let images = category_record(2, "images", &[("ru", "Картинки")]);

    let mut chatgpt = tool_record(1, "chatgpt", &[("ru", "ЧатГПТ"), ("en", "ChatGPT")]);
    chatgpt.category = Some(chat.clone());
    let mut midjourney = tool_record(2, "midjourney", &[("ru", "Миджорни")]);
    midjourney.category = Some(images.clone());
    midjourney.is_featured = true;

    Arc::new(
        InMemoryStore::new()
            .with_categories(vec![chat, images])
            .with_tools(vec![chatgpt, midjourney]),
    )
}
