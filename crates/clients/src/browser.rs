use std::ffi::OsString;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::Engine;
use headless_chrome::{Browser, LaunchOptionsBuilder, Tab};
use serde::Deserialize;
use tracing::{debug, info};
use url::Url;

use a11yscan_core::collaborators::{AuditReport, HeadlessBrowser};
use a11yscan_core::{Impact, Issue, WcagLevel};

/// In-page rule evaluation. Covers the machine-checkable subset of WCAG;
/// each finding carries its rule id, impact, criteria, and a selector.
const AUDIT_JS: &str = r#"
(() => {
  const issues = [];
  let passed = 0;
  let inapplicable = 0;

  const short = (el) => {
    let sel = el.tagName.toLowerCase();
    if (el.id) return sel + '#' + el.id;
    if (el.className && typeof el.className === 'string' && el.className.trim()) {
      sel += '.' + el.className.trim().split(/\s+/)[0];
    }
    return sel;
  };
  const snippet = (el) => (el.outerHTML || '').slice(0, 200);
  const rule = (applicable, violations, report) => {
    if (!applicable) { inapplicable += 1; return; }
    if (violations.length === 0) { passed += 1; return; }
    violations.forEach(report);
  };

  const images = Array.from(document.querySelectorAll('img'))
    .filter((img) => img.getAttribute('role') !== 'presentation'
                  && img.getAttribute('aria-hidden') !== 'true');
  rule(images.length > 0,
       images.filter((img) => !img.hasAttribute('alt')),
       (el) => issues.push({
         rule: 'image-alt', impact: 'CRITICAL', level: 'A', criteria: ['1.1.1'],
         description: 'Image has no alt attribute',
         help: 'Give every informative image a text alternative; mark decorative images with empty alt',
         selector: short(el), snippet: snippet(el),
       }));

  const html = document.documentElement;
  rule(true,
       (html.getAttribute('lang') || '').trim() ? [] : [html],
       (el) => issues.push({
         rule: 'html-has-lang', impact: 'SERIOUS', level: 'A', criteria: ['3.1.1'],
         description: 'Document language is not declared',
         help: 'Add a lang attribute to the html element',
         selector: 'html', snippet: snippet(el).slice(0, 80),
       }));

  rule(true,
       (document.title || '').trim() ? [] : [html],
       () => issues.push({
         rule: 'document-title', impact: 'SERIOUS', level: 'A', criteria: ['2.4.2'],
         description: 'Document has no title',
         help: 'Provide a title element describing the page',
         selector: 'head', snippet: '',
       }));

  const fields = Array.from(document.querySelectorAll('input, select, textarea'))
    .filter((el) => !['hidden', 'submit', 'button', 'reset', 'image'].includes(el.type));
  const hasLabel = (el) => {
    if (el.getAttribute('aria-label') || el.getAttribute('aria-labelledby')) return true;
    if (el.id && document.querySelector('label[for="' + CSS.escape(el.id) + '"]')) return true;
    return !!el.closest('label');
  };
  rule(fields.length > 0,
       fields.filter((el) => !hasLabel(el)),
       (el) => issues.push({
         rule: 'label', impact: 'CRITICAL', level: 'A', criteria: ['1.3.1', '3.3.2'],
         description: 'Form field has no associated label',
         help: 'Associate a label with every form control',
         selector: short(el), snippet: snippet(el),
       }));

  const links = Array.from(document.querySelectorAll('a[href]'));
  const name = (el) => (el.textContent || '').trim()
    || el.getAttribute('aria-label')
    || el.getAttribute('title')
    || Array.from(el.querySelectorAll('img[alt]')).map((i) => i.getAttribute('alt')).join(' ').trim();
  rule(links.length > 0,
       links.filter((el) => !name(el)),
       (el) => issues.push({
         rule: 'link-name', impact: 'SERIOUS', level: 'A', criteria: ['2.4.4', '4.1.2'],
         description: 'Link has no discernible text',
         help: 'Give links text content or an aria-label',
         selector: short(el), snippet: snippet(el),
       }));

  const buttons = Array.from(document.querySelectorAll('button, [role="button"]'));
  rule(buttons.length > 0,
       buttons.filter((el) => !name(el) && !el.getAttribute('value')),
       (el) => issues.push({
         rule: 'button-name', impact: 'CRITICAL', level: 'A', criteria: ['4.1.2'],
         description: 'Button has no accessible name',
         help: 'Give buttons text content or an aria-label',
         selector: short(el), snippet: snippet(el),
       }));

  const ids = {};
  Array.from(document.querySelectorAll('[id]')).forEach((el) => {
    ids[el.id] = (ids[el.id] || []).concat([el]);
  });
  const duplicated = Object.values(ids).filter((els) => els.length > 1);
  rule(Object.keys(ids).length > 0,
       duplicated.map((els) => els[1]),
       (el) => issues.push({
         rule: 'duplicate-id', impact: 'MINOR', level: 'A', criteria: ['4.1.1'],
         description: 'Duplicate id attribute value',
         help: 'Id values must be unique within the document',
         selector: short(el), snippet: snippet(el),
       }));

  const viewport = document.querySelector('meta[name="viewport"]');
  const vpContent = viewport ? (viewport.getAttribute('content') || '').toLowerCase() : '';
  rule(!!viewport,
       (vpContent.includes('user-scalable=no') || /maximum-scale=(0|1)([^0-9.]|$)/.test(vpContent))
         ? [viewport] : [],
       (el) => issues.push({
         rule: 'meta-viewport', impact: 'SERIOUS', level: 'AA', criteria: ['1.4.4'],
         description: 'Viewport meta tag disables zooming',
         help: 'Allow pinch-zoom; do not set user-scalable=no or a maximum-scale below 2',
         selector: 'meta[name="viewport"]', snippet: snippet(el),
       }));

  const headings = Array.from(document.querySelectorAll('h1, h2, h3, h4, h5, h6'));
  const skips = [];
  let previous = 0;
  headings.forEach((el) => {
    const current = parseInt(el.tagName[1], 10);
    if (previous > 0 && current > previous + 1) skips.push(el);
    previous = current;
  });
  rule(headings.length > 0, skips,
       (el) => issues.push({
         rule: 'heading-order', impact: 'MODERATE', level: 'A', criteria: ['1.3.1'],
         description: 'Heading level is skipped',
         help: 'Increase heading levels one step at a time',
         selector: short(el), snippet: snippet(el),
       }));

  return JSON.stringify({ issues, passed, inapplicable });
})()
"#;

#[derive(Deserialize)]
struct RawAudit {
    issues: Vec<RawIssue>,
    passed: i32,
    inapplicable: i32,
}

#[derive(Deserialize)]
struct RawIssue {
    rule: String,
    impact: String,
    level: String,
    criteria: Vec<String>,
    description: String,
    help: String,
    selector: String,
    snippet: String,
}

/// Real-browser collaborator built on headless Chromium. One long-lived
/// browser, one tab per operation.
pub struct ChromeBrowser {
    browser: Browser,
}

impl ChromeBrowser {
    pub fn launch() -> Result<Self> {
        let extra_args: Vec<OsString> = vec![
            // Required for running in containers
            OsString::from("--no-sandbox"),
            OsString::from("--disable-dev-shm-usage"),
            OsString::from("--disable-gpu"),
        ];

        let mut builder = LaunchOptionsBuilder::default();
        builder
            .headless(true)
            .window_size(Some((1280, 1024)))
            .args(extra_args.iter().map(|a| a.as_ref()).collect());

        if let Ok(chrome_path) = std::env::var("CHROME_PATH") {
            builder.path(Some(std::path::PathBuf::from(chrome_path)));
        }

        let browser = Browser::new(builder.build().map_err(|e| anyhow!(e))?)?;
        info!("headless browser ready");
        Ok(Self { browser })
    }

    async fn load(&self, url: &str, timeout: Duration) -> Result<std::sync::Arc<Tab>> {
        let tab = self.browser.new_tab().map_err(|e| anyhow!("new tab: {e}"))?;
        tab.navigate_to(url).map_err(|e| anyhow!("navigate: {e}"))?;
        tab.wait_until_navigated()
            .map_err(|e| anyhow!("navigation wait: {e}"))?;

        // Give scripts a moment to settle; bail out at the caller timeout.
        let started = Instant::now();
        loop {
            if started.elapsed() > timeout {
                return Err(anyhow!("render timeout after {}s", timeout.as_secs()));
            }
            let html = tab.get_content().map_err(|e| anyhow!("content: {e}"))?;
            if html.len() > 500 || started.elapsed() > Duration::from_secs(5) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
        Ok(tab)
    }
}

#[async_trait]
impl HeadlessBrowser for ChromeBrowser {
    async fn audit(
        &self,
        url: &Url,
        level: WcagLevel,
        timeout: Duration,
    ) -> Result<AuditReport> {
        let tab = self.load(url.as_str(), timeout).await?;

        let evaluated = tab
            .evaluate(AUDIT_JS, false)
            .map_err(|e| anyhow!("audit script: {e}"))?;
        let json = evaluated
            .value
            .and_then(|v| v.as_str().map(|s| s.to_string()))
            .context("audit script returned no value")?;
        let raw: RawAudit = serde_json::from_str(&json).context("audit output parse")?;

        let mut issues = Vec::new();
        let mut skipped = 0;
        for raw_issue in raw.issues {
            let Some(rule_level) = WcagLevel::parse(&raw_issue.level) else {
                skipped += 1;
                continue;
            };
            if !level.includes(rule_level) {
                skipped += 1;
                continue;
            }
            let Some(impact) = Impact::parse(&raw_issue.impact) else {
                skipped += 1;
                continue;
            };
            let slug = raw_issue.rule.clone();
            issues.push(Issue {
                rule_id: raw_issue.rule,
                impact,
                wcag_criteria: raw_issue.criteria,
                description: raw_issue.description,
                help_text: raw_issue.help,
                help_url: format!("https://www.w3.org/WAI/WCAG21/quickref/?q={slug}"),
                html_snippet: (!raw_issue.snippet.is_empty()).then_some(raw_issue.snippet),
                css_selector: (!raw_issue.selector.is_empty()).then_some(raw_issue.selector),
                ai_explanation: None,
                ai_fix_suggestion: None,
                ai_priority: None,
            });
        }
        debug!(url = %url, issues = issues.len(), skipped, "audit finished");

        let report = AuditReport {
            http_status: Some(200),
            content_type: Some("text/html".to_string()),
            issues,
            passed_checks: raw.passed,
            inapplicable_checks: raw.inapplicable,
        };

        let _ = tab.close(true);
        Ok(report)
    }

    async fn render_pdf(&self, html: &str, timeout: Duration) -> Result<Vec<u8>> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(html);
        let data_url = format!("data:text/html;base64,{encoded}");
        let tab = self.load(&data_url, timeout).await?;
        let pdf = tab
            .print_to_pdf(None)
            .map_err(|e| anyhow!("print to pdf: {e}"))?;
        let _ = tab.close(true);
        Ok(pdf)
    }
}
