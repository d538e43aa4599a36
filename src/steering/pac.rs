//! PAC (proxy auto-config) script generation.
//!
//! The generated `FindProxyForURL` sends hosts that match a blocked suffix to
//! the local proxy and everything else direct. Domains are sorted so the same
//! block list always produces byte-identical output.

use std::fs;
use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

use super::error::SteeringError;
use crate::blocklist::host_matches;

/// Routing result for hosts that are not blocked.
pub const DIRECT: &str = "DIRECT";

/// A generated PAC script and the inputs it was built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacDocument {
    script: String,
    domains: Vec<String>,
    port: u16,
}

impl PacDocument {
    /// Generate a fresh script for the given domains and proxy port.
    pub fn generate<I>(domains: I, port: u16) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut domains: Vec<String> = domains
            .into_iter()
            .map(|d| d.as_ref().trim().to_ascii_lowercase())
            .filter(|d| !d.is_empty())
            .collect();
        domains.sort();
        domains.dedup();

        let script = render(&domains, port);
        Self {
            script,
            domains,
            port,
        }
    }

    /// Script text.
    pub fn script(&self) -> &str {
        &self.script
    }

    /// Domains the script routes to the proxy, sorted.
    pub fn domains(&self) -> &[String] {
        &self.domains
    }

    /// Proxy port referenced by the script.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Routing string for the proxy, e.g. `PROXY 127.0.0.1:8899`.
    pub fn proxy_route(&self) -> String {
        proxy_route(self.port)
    }

    /// What the script returns for `host`.
    pub fn route(&self, host: &str) -> String {
        let host = host.to_ascii_lowercase();
        if self.domains.iter().any(|d| host_matches(&host, d)) {
            self.proxy_route()
        } else {
            DIRECT.to_string()
        }
    }

    /// Write the script to `path`, replacing any previous file.
    ///
    /// The script goes to a temporary file in the same directory first and
    /// is renamed over `path`, so readers never see a partial script.
    pub fn write_to(&self, path: &Path) -> Result<(), SteeringError> {
        let pac_write = |source| SteeringError::PacWrite {
            path: path.to_path_buf(),
            source,
        };

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir).map_err(pac_write)?;

        let mut staged = NamedTempFile::new_in(dir).map_err(pac_write)?;
        staged
            .write_all(self.script.as_bytes())
            .and_then(|()| staged.as_file().sync_all())
            .map_err(pac_write)?;
        staged.persist(path).map_err(|e| pac_write(e.error))?;
        Ok(())
    }
}

/// `file://` URL for a PAC file.
pub fn pac_url(path: &Path) -> String {
    format!("file://{}", path.display())
}

fn proxy_route(port: u16) -> String {
    format!("PROXY 127.0.0.1:{}", port)
}

fn render(domains: &[String], port: u16) -> String {
    // JSON string literals are valid JavaScript string literals
    let list = serde_json::to_string(domains).unwrap_or_else(|_| "[]".to_string());

    format!(
        r#"function FindProxyForURL(url, host) {{
  host = host.toLowerCase();
  var blocked = {list};
  for (var i = 0; i < blocked.length; i++) {{
    var d = blocked[i];
    if (host === d || host.endsWith("." + d)) {{
      return "{route}";
    }}
  }}
  return "{direct}";
}}
"#,
        list = list,
        route = proxy_route(port),
        direct = DIRECT,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_script_shape() {
        let pac = PacDocument::generate(["youtube.com"], 8899);
        let script = pac.script();

        assert!(script.starts_with("function FindProxyForURL(url, host) {"));
        assert!(script.contains("host = host.toLowerCase();"));
        assert!(script.contains(r#"var blocked = ["youtube.com"];"#));
        assert!(script.contains(r#"return "PROXY 127.0.0.1:8899";"#));
        assert!(script.contains(r#"return "DIRECT";"#));
    }

    #[test]
    fn test_domains_are_sorted_and_deduplicated() {
        let pac = PacDocument::generate(["reddit.com", "YouTube.com", "reddit.com"], 9000);
        assert_eq!(pac.domains(), ["reddit.com", "youtube.com"]);
        assert!(pac.script().contains(r#"["reddit.com","youtube.com"]"#));
    }

    #[test]
    fn test_generation_is_deterministic() {
        let a = PacDocument::generate(["b.com", "a.com"], 8899);
        let b = PacDocument::generate(["a.com", "b.com"], 8899);
        assert_eq!(a.script(), b.script());
    }

    #[test]
    fn test_route_mirrors_suffix_rule() {
        let pac = PacDocument::generate(["youtube.com"], 8899);

        assert_eq!(pac.route("youtube.com"), "PROXY 127.0.0.1:8899");
        assert_eq!(pac.route("M.YouTube.com"), "PROXY 127.0.0.1:8899");
        assert_eq!(pac.route("evilyoutube.com"), "DIRECT");
        assert_eq!(pac.route("example.org"), "DIRECT");
    }

    #[test]
    fn test_empty_list_routes_everything_direct() {
        let pac = PacDocument::generate(Vec::<String>::new(), 8899);
        assert!(pac.script().contains("var blocked = [];"));
        assert_eq!(pac.route("youtube.com"), "DIRECT");
    }

    #[test]
    fn test_write_replaces_previous_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("focus.pac");

        PacDocument::generate(["a.com"], 1).write_to(&path).unwrap();
        PacDocument::generate(["b.com"], 2).write_to(&path).unwrap();

        let written = fs::read_to_string(&path).unwrap();
        assert!(written.contains("b.com"));
        assert!(!written.contains("a.com"));
    }

    #[test]
    fn test_write_leaves_no_staging_files() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("focus.pac");

        PacDocument::generate(["a.com"], 1).write_to(&path).unwrap();
        PacDocument::generate(["b.com"], 2).write_to(&path).unwrap();

        let entries: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("focus.pac")]);
    }

    #[test]
    fn test_write_into_missing_parent_fails_cleanly() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "x").unwrap();

        let result = PacDocument::generate(["a.com"], 1).write_to(&blocker.join("focus.pac"));
        assert!(matches!(result, Err(SteeringError::PacWrite { .. })));
    }

    #[test]
    fn test_route_matches_leading_dot_host_like_script() {
        let pac = PacDocument::generate(["youtube.com"], 8899);
        assert!(pac.script().contains(r#"host.endsWith("." + d)"#));
        assert_eq!(pac.route(".youtube.com"), "PROXY 127.0.0.1:8899");
    }

    #[test]
    fn test_pac_url() {
        assert_eq!(
            pac_url(Path::new("/tmp/focus-warden.pac")),
            "file:///tmp/focus-warden.pac"
        );
    }
}
