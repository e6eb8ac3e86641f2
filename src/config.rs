use crate::error::Error;
use ipnetwork::IpNetwork;
use lazy_static::lazy_static;
use serde::Deserialize;
use serde_with::{serde_as, DurationSeconds};
use std::fs::File;
use std::io::BufReader;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use trust_dns_client::rr::Name;

pub type Shared = Arc<Config>;

#[serde_as]
#[derive(Deserialize, Debug, Clone)]
pub struct Config {
    /// Root origin. Each user owns `<username>.<domain>`.
    pub domain: Name,
    #[serde(default = "default_bind_dir")]
    pub bind_dir: PathBuf,
    #[serde(default = "default_templates_dir")]
    pub templates_dir: PathBuf,
    pub api_bind_addr: SocketAddr,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub api_timeout: Duration,
    #[serde(default = "default_remote_user_header")]
    pub remote_user_header: String,
    /// Pins the advertised nameserver address, skipping discovery.
    #[serde(default)]
    pub public_ip: Option<Ipv4Addr>,
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "default_public_ip_refresh")]
    pub public_ip_refresh: Duration,
    #[serde(default = "default_public_ip_endpoints")]
    pub public_ip_endpoints: Vec<String>,
    #[serde(default)]
    pub named: NamedConfig,
}

/// Paths of the BIND tools driven by [`crate::named::NamedProcess`].
#[serde_as]
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct NamedConfig {
    pub named: String,
    pub checkconf: String,
    pub checkzone: String,
    pub rndc: String,
    pub pgrep: String,
    pub conf_file: PathBuf,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub timeout: Duration,
}

impl Default for NamedConfig {
    fn default() -> Self {
        NamedConfig {
            named: "named".to_string(),
            checkconf: "named-checkconf".to_string(),
            checkzone: "named-checkzone".to_string(),
            rndc: "rndc".to_string(),
            pgrep: "pgrep".to_string(),
            conf_file: PathBuf::from("/etc/bind/named.conf"),
            timeout: Duration::from_secs(5),
        }
    }
}

fn default_bind_dir() -> PathBuf {
    PathBuf::from("/etc/bind")
}

fn default_templates_dir() -> PathBuf {
    PathBuf::from("templates/bind")
}

fn default_remote_user_header() -> String {
    "remote-user".to_string()
}

fn default_public_ip_refresh() -> Duration {
    Duration::from_secs(60 * 60)
}

fn default_public_ip_endpoints() -> Vec<String> {
    [
        "https://ifconfig.me",
        "https://api.ipify.org",
        "https://ipinfo.io/ip",
        "https://icanhazip.com",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

lazy_static! {
    // NOTE(XXX): Once the "ip" feature has stabilized we can use Ipv6Addr.is_unique_local[0].
    //            Presently this feature is unstable so we home-roll. See also RFC 4193[1].
    // [0]: https://doc.rust-lang.org/std/net/struct.Ipv6Addr.html#method.is_unique_local
    // [1]: https://www.rfc-editor.org/rfc/rfc4193.html
    static ref IPV6_UNIQUE_LOCAL_NETWORK: IpNetwork = IpNetwork::from_str("fc00::/7").unwrap();
}

impl Config {
    pub fn try_from_file(p: impl AsRef<Path>) -> Result<Self, Error> {
        let f = File::open(p)?;
        let reader = BufReader::new(f);
        let conf: Config = serde_json::from_reader(reader)?;
        conf.bind_addr_is_secure()?;
        Ok(conf)
    }

    /// The root origin, always dot-terminated.
    #[must_use]
    pub fn origin(&self) -> Name {
        let mut origin = self.domain.clone();
        origin.set_fqdn(true);
        origin
    }

    fn bind_addr_is_secure(&self) -> Result<(), Error> {
        match self.api_bind_addr {
            SocketAddr::V4(v4_addr) => {
                let ip = v4_addr.ip();
                if !ip.is_loopback() && !ip.is_private() {
                    return Err(Error::InsecureAPIBind(IpAddr::V4(*ip)));
                }
                Ok(())
            }
            SocketAddr::V6(v6_addr) => {
                let ip = v6_addr.ip();
                if !ip.is_loopback() && !IPV6_UNIQUE_LOCAL_NETWORK.contains(IpAddr::V6(*ip)) {
                    return Err(Error::InsecureAPIBind(IpAddr::V6(*ip)));
                }
                Ok(())
            }
        }
    }
}
