//! Headed Chrome over CDP.

use crate::config::BrowserConfig as LaunchSettings;
use crate::session::{BrowserBackend, BrowserError, BrowserLauncher, FillResult, PageDriver};
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use std::{sync::Arc, time::Duration};
use tokio::{sync::Mutex, task::JoinHandle, time::Instant};
use tracing::warn;

const WINDOW_WIDTH: u32 = 1280;
const WINDOW_HEIGHT: u32 = 800;
const SELECTOR_POLL: Duration = Duration::from_millis(250);

pub struct ChromiumLauncher {
    settings: LaunchSettings,
}

impl ChromiumLauncher {
    pub fn new(settings: LaunchSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn launch(&self) -> Result<Box<dyn BrowserBackend>, BrowserError> {
        let chrome_path = self
            .settings
            .chrome_path
            .as_ref()
            .ok_or_else(|| BrowserError::Config("Chrome path not configured (CHROME_PATH)".into()))?;
        if !chrome_path.exists() {
            return Err(BrowserError::Config(format!(
                "Chrome executable not found at {}",
                chrome_path.display()
            )));
        }

        // Visible window: logins and final submission are done by a human.
        let config = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .with_head()
            .user_data_dir(&self.settings.user_data_dir)
            .window_size(WINDOW_WIDTH, WINDOW_HEIGHT)
            .viewport(Viewport {
                width: WINDOW_WIDTH,
                height: WINDOW_HEIGHT,
                ..Viewport::default()
            })
            .args([
                "--disable-blink-features=AutomationControlled",
                "--no-first-run",
                "--no-default-browser-check",
            ])
            .build()
            .map_err(BrowserError::Config)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|err| BrowserError::Launch(err.to_string()))?;
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    warn!(target = "reseller.session", error = %err, "cdp handler error");
                }
            }
        });

        Ok(Box::new(ChromiumBrowser {
            browser: Mutex::new(browser),
            handler,
        }))
    }
}

struct ChromiumBrowser {
    browser: Mutex<Browser>,
    handler: JoinHandle<()>,
}

#[async_trait]
impl BrowserBackend for ChromiumBrowser {
    async fn pages(&self) -> Result<Vec<Arc<dyn PageDriver>>, BrowserError> {
        let pages = self
            .browser
            .lock()
            .await
            .pages()
            .await
            .map_err(|err| BrowserError::Protocol(err.to_string()))?;
        Ok(pages
            .into_iter()
            .map(|page| Arc::new(ChromiumPage { page }) as Arc<dyn PageDriver>)
            .collect())
    }

    async fn new_page(&self) -> Result<Arc<dyn PageDriver>, BrowserError> {
        let page = self
            .browser
            .lock()
            .await
            .new_page("about:blank")
            .await
            .map_err(|err| BrowserError::Protocol(err.to_string()))?;
        Ok(Arc::new(ChromiumPage { page }))
    }

    async fn close(&self) -> Result<(), BrowserError> {
        let mut browser = self.browser.lock().await;
        let closed = browser
            .close()
            .await
            .map_err(|err| BrowserError::Protocol(err.to_string()));
        let _ = browser.wait().await;
        self.handler.abort();
        closed.map(|_| ())
    }
}

struct ChromiumPage {
    page: Page,
}

#[async_trait]
impl PageDriver for ChromiumPage {
    async fn goto(&self, url: &str) -> Result<(), BrowserError> {
        self.page
            .goto(url)
            .await
            .map_err(|err| BrowserError::Navigation {
                url: url.to_string(),
                message: err.to_string(),
            })?;
        Ok(())
    }

    async fn current_url(&self) -> Result<Option<String>, BrowserError> {
        self.page
            .url()
            .await
            .map_err(|err| BrowserError::Protocol(err.to_string()))
    }

    async fn set_user_agent(&self, user_agent: &str) -> Result<(), BrowserError> {
        self.page
            .set_user_agent(SetUserAgentOverrideParams::new(user_agent))
            .await
            .map_err(|err| BrowserError::Protocol(err.to_string()))?;
        Ok(())
    }

    async fn wait_for_selector(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> Result<(), BrowserError> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.page.find_element(selector).await.is_ok() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(BrowserError::Timeout {
                    selector: selector.to_string(),
                    timeout,
                });
            }
            tokio::time::sleep(SELECTOR_POLL).await;
        }
    }

    async fn type_into(&self, selector: &str, text: &str) -> Result<FillResult, BrowserError> {
        let Ok(element) = self.page.find_element(selector).await else {
            return Ok(FillResult::NotFound);
        };
        element
            .click()
            .await
            .map_err(|err| BrowserError::Protocol(err.to_string()))?
            .type_str(text)
            .await
            .map_err(|err| BrowserError::Protocol(err.to_string()))?;
        Ok(FillResult::Filled)
    }

    async fn click(&self, selector: &str) -> Result<(), BrowserError> {
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(|_| BrowserError::NotFound(selector.to_string()))?;
        element
            .click()
            .await
            .map_err(|err| BrowserError::Protocol(err.to_string()))?;
        Ok(())
    }

    async fn click_text(&self, text: &str) -> Result<(), BrowserError> {
        let needle =
            serde_json::to_string(text).map_err(|err| BrowserError::Protocol(err.to_string()))?;
        let script = format!(
            r#"(function(){{
                const wanted={needle};
                const nodes=document.querySelectorAll('button,a,li,label,option,span,div,[role="option"]');
                for(const n of nodes){{
                    if(n.offsetParent!==null&&n.textContent.trim()===wanted){{n.click();return true}}
                }}
                return false;
            }})()"#
        );
        let clicked: bool = self
            .page
            .evaluate(script)
            .await
            .map_err(|err| BrowserError::Protocol(err.to_string()))?
            .into_value()
            .map_err(|err| BrowserError::Protocol(err.to_string()))?;
        if clicked {
            Ok(())
        } else {
            Err(BrowserError::NotFound(format!("text \"{text}\"")))
        }
    }

    async fn press_key(&self, key: &str) -> Result<(), BrowserError> {
        let focused = self
            .page
            .find_element("*:focus")
            .await
            .map_err(|_| BrowserError::NotFound("focused element".into()))?;
        focused
            .press_key(key)
            .await
            .map_err(|err| BrowserError::Protocol(err.to_string()))?;
        Ok(())
    }
}
