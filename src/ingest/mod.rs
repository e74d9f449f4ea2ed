//! Source clients.
//!
//! - `havvarsel`: bathing water temperatures from havvarsel-frost.met.no
//! - `frost`: station observations from frost.met.no
//! - `opendap`: DAP2 text protocol used by the THREDDS sources
//! - `thredds`: nearest-cell timeseries extraction from daily model files
//! - `norkyst`: NorKyst-800 ocean model
//! - `postprocessed`: post-processed MET Nordic weather forecasts

pub mod frost;
pub mod havvarsel;
pub mod norkyst;
pub mod opendap;
pub mod postprocessed;
pub mod thredds;

use reqwest::blocking::{Client, RequestBuilder};

use crate::model::ImportError;

/// Sends a request and returns the body, mapping non-2xx to `Http`.
pub(crate) fn send_text(request: RequestBuilder) -> Result<String, ImportError> {
    let response = request.send()?;
    if !response.status().is_success() {
        return Err(ImportError::Http(response.status().as_u16()));
    }
    Ok(response.text()?)
}

pub(crate) fn fetch_text(client: &Client, url: &str) -> Result<String, ImportError> {
    send_text(client.get(url))
}

/// Reads a JSON number that some APIs serialize as a string.
pub(crate) fn json_f64(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Minimal HTTP/1.1 server for offline tests of the source clients.
#[cfg(test)]
pub(crate) mod test_server {
    use std::io::{BufRead, BufReader, Write};
    use std::net::{TcpListener, TcpStream};
    use std::sync::Arc;

    /// Maps a request target (path and query, `%5B`/`%5D` decoded) to a
    /// status code and body.
    pub type Handler = Arc<dyn Fn(&str) -> (u16, String) + Send + Sync>;

    /// Serves `handler` on a free local port and returns `http://127.0.0.1:<port>`.
    pub fn serve(handler: impl Fn(&str) -> (u16, String) + Send + Sync + 'static) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let handler: Handler = Arc::new(handler);
        std::thread::spawn(move || {
            for stream in listener.incoming().flatten() {
                let handler = Arc::clone(&handler);
                std::thread::spawn(move || respond(stream, &handler));
            }
        });
        base
    }

    fn respond(mut stream: TcpStream, handler: &Handler) {
        let Ok(clone) = stream.try_clone() else { return };
        let mut reader = BufReader::new(clone);
        let mut request_line = String::new();
        if reader.read_line(&mut request_line).is_err() {
            return;
        }
        loop {
            let mut header = String::new();
            match reader.read_line(&mut header) {
                Ok(0) | Err(_) => break,
                Ok(_) if header == "\r\n" || header == "\n" => break,
                Ok(_) => {}
            }
        }

        let target = request_line
            .split_whitespace()
            .nth(1)
            .unwrap_or("/")
            .replace("%5B", "[")
            .replace("%5D", "]");
        let (status, body) = handler(&target);
        let _ = write!(
            stream,
            "HTTP/1.1 {} X\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );
        let _ = stream.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_f64_accepts_numbers_and_numeric_strings() {
        assert_eq!(json_f64(&json!(10.5)), Some(10.5));
        assert_eq!(json_f64(&json!("10.5")), Some(10.5));
        assert_eq!(json_f64(&json!(" 7 ")), Some(7.0));
        assert_eq!(json_f64(&json!("n/a")), None);
        assert_eq!(json_f64(&json!(null)), None);
    }

    #[test]
    fn test_fetch_text_maps_status_codes() {
        let base = test_server::serve(|target| match target {
            "/ok" => (200, "hello".to_string()),
            _ => (404, "not here".to_string()),
        });
        let client = Client::new();
        assert_eq!(fetch_text(&client, &format!("{}/ok", base)).unwrap(), "hello");
        let err = fetch_text(&client, &format!("{}/missing", base)).unwrap_err();
        assert!(matches!(err, ImportError::Http(404)));
    }
}
