use std::collections::HashMap;
use std::fs;
use std::path::{
  Path,
  PathBuf
};
use std::time::Duration;

use anyhow::{
  Context,
  anyhow
};
use tracing::{
  debug,
  info,
  trace,
  warn
};

use crate::store::WriteFailurePolicy;
use crate::view::GroupOrder;

pub const DEFAULT_API_URL: &str =
  "http://localhost:5000";
pub const DEFAULT_SERVER_PORT: u16 =
  5000;
pub const DEFAULT_CORS_ORIGIN: &str =
  "http://localhost:3000";

#[derive(Debug, Clone)]
pub struct Config {
  map: HashMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

impl Default for Config {
  fn default() -> Self {
    let mut map = HashMap::new();
    for (key, value) in [
      ("api.url", DEFAULT_API_URL),
      ("api.timeout", "30"),
      ("sync.on_failure", "rollback"),
      ("view.group_order", "first"),
      ("color", "on"),
      ("server.data", ".saleslog_data"),
      (
        "server.cors_origin",
        DEFAULT_CORS_ORIGIN
      )
    ] {
      map.insert(
        key.to_string(),
        value.to_string()
      );
    }

    Self {
      map,
      loaded_files: vec![]
    }
  }
}

impl Config {
  #[tracing::instrument(skip(
    rc_override
  ))]
  pub fn load(
    rc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Config::default();

    let rc_path =
      resolve_rc_path(rc_override)?;
    if let Some(path) = rc_path {
      info!(rc = %path.display(), "loading saleslogrc");
      cfg.load_file(&path)?;
    } else {
      debug!(
        "no saleslogrc found; using \
         defaults"
      );
    }

    Ok(cfg)
  }

  #[tracing::instrument(skip(
    self, overrides
  ))]
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (k, v) in overrides {
      let key = k
        .strip_prefix("rc.")
        .unwrap_or(&k)
        .to_string();
      debug!(key = %key, value = %v, "applying override");
      self.map.insert(key, v);
    }
  }

  pub fn get(
    &self,
    key: &str
  ) -> Option<String> {
    self.map.get(key).cloned()
  }

  pub fn get_bool(
    &self,
    key: &str
  ) -> Option<bool> {
    self
      .map
      .get(key)
      .map(|v| parse_bool(v))
  }

  pub fn set(
    &mut self,
    key: &str,
    value: &str
  ) {
    self.map.insert(
      key.to_string(),
      value.to_string()
    );
  }

  pub fn api_url(&self) -> String {
    self
      .get("api.url")
      .unwrap_or_else(|| {
        DEFAULT_API_URL.to_string()
      })
  }

  /// `api.timeout = 0` disables the
  /// request timeout.
  pub fn api_timeout(
    &self
  ) -> anyhow::Result<Option<Duration>>
  {
    let Some(raw) =
      self.get("api.timeout")
    else {
      return Ok(None);
    };
    let secs = raw
      .trim()
      .parse::<u64>()
      .map_err(|_| {
        anyhow!(
          "invalid api.timeout: {raw}"
        )
      })?;
    Ok((secs > 0)
      .then(|| Duration::from_secs(secs)))
  }

  pub fn failure_policy(
    &self
  ) -> anyhow::Result<WriteFailurePolicy>
  {
    self
      .get("sync.on_failure")
      .map(|raw| {
        raw.parse::<WriteFailurePolicy>()
      })
      .transpose()
      .map(Option::unwrap_or_default)
  }

  pub fn group_order(
    &self
  ) -> anyhow::Result<GroupOrder> {
    self
      .get("view.group_order")
      .map(|raw| {
        raw.parse::<GroupOrder>()
      })
      .transpose()
      .map(Option::unwrap_or_default)
  }

  /// `PORT` wins over `server.port`.
  pub fn server_port(
    &self
  ) -> anyhow::Result<u16> {
    let raw = std::env::var("PORT")
      .ok()
      .or_else(|| {
        self.get("server.port")
      });
    match raw {
      | Some(raw) => {
        raw.trim().parse::<u16>().map_err(
          |_| {
            anyhow!(
              "invalid server port: \
               {raw}"
            )
          }
        )
      }
      | None => Ok(DEFAULT_SERVER_PORT)
    }
  }

  /// `SALESLOG_DATA` wins over
  /// `server.data`.
  pub fn server_data_dir(
    &self
  ) -> PathBuf {
    if let Ok(path) =
      std::env::var("SALESLOG_DATA")
    {
      return PathBuf::from(path);
    }
    let raw = self
      .get("server.data")
      .unwrap_or_else(|| {
        ".saleslog_data".to_string()
      });
    expand_tilde(Path::new(&raw))
  }

  pub fn cors_origin(&self) -> String {
    self
      .get("server.cors_origin")
      .unwrap_or_else(|| {
        DEFAULT_CORS_ORIGIN.to_string()
      })
  }

  #[tracing::instrument(skip(self))]
  fn load_file(
    &mut self,
    path: &Path
  ) -> anyhow::Result<()> {
    let path = expand_tilde(path);
    let text =
      fs::read_to_string(&path)
        .with_context(|| {
          format!(
            "failed to read {}",
            path.display()
          )
        })?;

    self
      .loaded_files
      .push(path.clone());

    let base_dir = path
      .parent()
      .map(|p| p.to_path_buf())
      .unwrap_or_else(|| {
        PathBuf::from(".")
      });

    for (line_num, raw_line) in
      text.lines().enumerate()
    {
      let mut line = raw_line.trim();
      if line.is_empty()
        || line.starts_with('#')
      {
        continue;
      }

      if let Some((before, _)) =
        line.split_once(" #")
      {
        line = before.trim();
      }

      if let Some(include_rest) =
        line.strip_prefix("include ")
      {
        let include_path =
          resolve_include_path(
            &base_dir,
            include_rest.trim()
          )?;
        debug!(
            file = %path.display(),
            include = %include_path.display(),
            line = line_num + 1,
            "processing include"
        );

        if include_path.exists() {
          self
            .load_file(&include_path)?;
        } else {
          warn!(include = %include_path.display(), "include file does not exist; skipping");
        }
        continue;
      }

      let (k, v) = line
        .split_once('=')
        .ok_or_else(|| {
          anyhow!(
            "invalid config line \
             {}:{}: {}",
            path.display(),
            line_num + 1,
            raw_line
          )
        })?;

      let key = k.trim().to_string();
      let value = v.trim().to_string();
      trace!(key = %key, value = %value, "loaded config key");
      self.map.insert(key, value);
    }

    Ok(())
  }
}

#[tracing::instrument(skip(
  override_path
))]
fn resolve_rc_path(
  override_path: Option<&Path>
) -> anyhow::Result<Option<PathBuf>> {
  if let Some(path) = override_path {
    return Ok(Some(path.to_path_buf()));
  }

  if let Ok(rc_env) =
    std::env::var("SALESLOGRC")
  {
    if rc_env == "/dev/null" {
      return Ok(None);
    }
    return Ok(Some(PathBuf::from(
      rc_env
    )));
  }

  let Some(home) = dirs::home_dir()
  else {
    return Ok(None);
  };
  let candidate =
    home.join(".saleslogrc");
  if candidate.exists() {
    return Ok(Some(candidate));
  }

  Ok(None)
}

fn resolve_include_path(
  base_dir: &Path,
  include: &str
) -> anyhow::Result<PathBuf> {
  if include.trim().is_empty() {
    return Err(anyhow!(
      "include path cannot be empty"
    ));
  }

  let raw = PathBuf::from(include);
  let expanded = expand_tilde(&raw);
  if expanded.is_absolute() {
    Ok(expanded)
  } else {
    Ok(base_dir.join(expanded))
  }
}

fn expand_tilde(
  path: &Path
) -> PathBuf {
  let text = path.to_string_lossy();
  if let Some(rest) =
    text.strip_prefix("~/")
    && let Some(home) = dirs::home_dir()
  {
    return home.join(rest);
  }
  path.to_path_buf()
}

fn parse_bool(s: &str) -> bool {
  matches!(
    s.trim()
      .to_ascii_lowercase()
      .as_str(),
    "1" | "y" | "yes" | "on" | "true"
  )
}
