// tests/dev_server.rs

mod common;
use crate::common::{init_tracing, with_timeout};

use std::error::Error;
use std::time::Duration;

use tokio::sync::broadcast;

use assetpipe::engine::ReloadSignal;
use assetpipe::server::{RELOAD_CLIENT, RELOAD_PATH, inject_reload_client, start};

type TestResult = Result<(), Box<dyn Error>>;

#[test]
fn reload_client_goes_before_the_closing_body_tag() {
    assert_eq!(
        inject_reload_client("<body><p>x</p></body></html>"),
        format!("<body><p>x</p>{RELOAD_CLIENT}</body></html>")
    );
    assert_eq!(inject_reload_client("<p>fragment</p>"), format!("<p>fragment</p>{RELOAD_CLIENT}"));
    assert!(RELOAD_CLIENT.contains(RELOAD_PATH));
}

/// A project directory whose `public/` is the served root, with a file
/// beside it that must stay unreachable.
fn output_root() -> Result<(tempfile::TempDir, std::path::PathBuf), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let public = dir.path().join("public");
    std::fs::create_dir_all(public.join("styles"))?;
    std::fs::create_dir_all(public.join("docs"))?;
    std::fs::create_dir_all(public.join("images"))?;
    std::fs::write(public.join("index.html"), "<html><body><h1>Home</h1></body></html>\n")?;
    std::fs::write(public.join("styles/app.min.css"), ".app{color:red}")?;
    std::fs::write(public.join("docs/index.html"), "<p>docs</p>")?;
    std::fs::write(public.join("images/my icon.svg"), "<svg/>")?;
    std::fs::write(public.join("caf\u{e9}.txt"), "menu")?;
    std::fs::write(dir.path().join("secret.txt"), "hidden")?;
    Ok((dir, public))
}

#[tokio::test]
async fn serves_output_files_and_injects_the_reload_client() -> TestResult {
    init_tracing();
    let (_dir, public) = output_root()?;
    let (reload_tx, _) = broadcast::channel::<ReloadSignal>(4);
    let server = start(0, &public, reload_tx).await?;
    let base = server.url();

    let home = reqwest::get(&base).await?;
    assert_eq!(home.status(), 200);
    assert!(home.headers()["content-type"].to_str()?.starts_with("text/html"));
    assert_eq!(
        home.text().await?,
        format!("<html><body><h1>Home</h1>{RELOAD_CLIENT}</body></html>\n")
    );

    let css = reqwest::get(format!("{base}styles/app.min.css")).await?;
    assert!(css.headers()["content-type"].to_str()?.starts_with("text/css"));
    assert_eq!(css.text().await?, ".app{color:red}");

    let docs = reqwest::get(format!("{base}docs/")).await?;
    assert_eq!(docs.text().await?, format!("<p>docs</p>{RELOAD_CLIENT}"));

    let missing = reqwest::get(format!("{base}scripts/nope.js")).await?;
    assert_eq!(missing.status(), 404);

    server.shutdown();
    Ok(())
}

#[tokio::test]
async fn percent_encoded_names_are_decoded_and_traversal_is_refused() -> TestResult {
    init_tracing();
    let (_dir, public) = output_root()?;
    let (reload_tx, _) = broadcast::channel::<ReloadSignal>(4);
    let server = start(0, &public, reload_tx).await?;
    let base = server.url();

    let icon = reqwest::get(format!("{base}images/my%20icon.svg")).await?;
    assert_eq!(icon.status(), 200);
    assert_eq!(icon.headers()["content-type"], "image/svg+xml");
    assert_eq!(icon.text().await?, "<svg/>");

    let menu = reqwest::get(format!("{base}caf%C3%A9.txt")).await?;
    assert_eq!(menu.status(), 200);
    assert_eq!(menu.text().await?, "menu");

    let escaped = reqwest::get(format!("{base}..%2Fsecret.txt")).await?;
    assert_eq!(escaped.status(), 404);

    server.shutdown();
    Ok(())
}

#[tokio::test]
async fn long_poll_answers_with_the_reload_generation() -> TestResult {
    init_tracing();
    let (_dir, public) = output_root()?;
    let (reload_tx, _) = broadcast::channel::<ReloadSignal>(4);
    let server = start(0, &public, reload_tx.clone()).await?;
    let url = format!("http://{}{RELOAD_PATH}", server.addr());

    let poll = tokio::spawn(async move {
        let response = reqwest::get(url).await?;
        let status = response.status();
        response.text().await.map(|body| (status, body))
    });

    // Wait until the handler has subscribed before signalling.
    with_timeout(async {
        while reload_tx.receiver_count() == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    reload_tx.send(ReloadSignal { generation: 7 })?;

    let (status, body) = with_timeout(poll).await??;
    assert_eq!(status, 200);
    assert_eq!(body, "7");

    server.shutdown();
    Ok(())
}
