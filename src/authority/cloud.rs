//! Sovereign cloud instances and their login hosts.

// self
use crate::{_prelude::*, authority::AuthorityError};

/// Cloud instance hosting the authority.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloudInstance {
	/// Azure public cloud (`login.microsoftonline.com`).
	#[default]
	AzurePublic,
	/// Azure operated by 21Vianet (`login.chinacloudapi.cn`).
	AzureChina,
	/// Azure US Government (`login.microsoftonline.us`).
	AzureUsGovernment,
	/// Any other authority origin (scheme, host, and port).
	Custom(Url),
}
impl CloudInstance {
	/// Login host for well-known instances.
	pub fn host(&self) -> Option<&str> {
		match self {
			Self::AzurePublic => Some("login.microsoftonline.com"),
			Self::AzureChina => Some("login.chinacloudapi.cn"),
			Self::AzureUsGovernment => Some("login.microsoftonline.us"),
			Self::Custom(origin) => origin.host_str(),
		}
	}

	/// Origin URL (`scheme://host[:port]/`) that tenant paths are joined onto.
	pub fn origin(&self) -> Result<Url, AuthorityError> {
		match self {
			Self::Custom(origin) => {
				let invalid =
					|reason| AuthorityError::InvalidUri { uri: origin.to_string(), reason };

				match origin.scheme() {
					"https" => (),
					"http" if is_loopback(origin) => (),
					_ => return Err(invalid("scheme must be https")),
				}

				if origin.cannot_be_a_base() || origin.host_str().is_none() {
					return Err(invalid("URI has no host"));
				}

				let mut origin = origin.clone();

				origin.set_path("/");
				origin.set_query(None);
				origin.set_fragment(None);

				Ok(origin)
			},
			_ => {
				let host = self.host().unwrap_or_default();

				Url::parse(&format!("https://{host}/")).map_err(AuthorityError::from)
			},
		}
	}

	/// Maps a URL's origin back onto a well-known instance, or [`CloudInstance::Custom`].
	pub fn from_url(url: &Url) -> Self {
		let well_known = [Self::AzurePublic, Self::AzureChina, Self::AzureUsGovernment];
		let default_https = url.scheme() == "https" && url.port().is_none();

		if let Some(instance) = well_known
			.into_iter()
			.find(|instance| default_https && instance.host() == url.host_str())
		{
			return instance;
		}

		let mut origin = url.clone();

		origin.set_path("/");
		origin.set_query(None);
		origin.set_fragment(None);

		Self::Custom(origin)
	}
}

/// Plain `http` is accepted only for these hosts.
pub(crate) fn is_loopback(url: &Url) -> bool {
	match url.host() {
		Some(url::Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
		Some(url::Host::Ipv4(ip)) => ip.is_loopback(),
		Some(url::Host::Ipv6(ip)) => ip.is_loopback(),
		None => false,
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn well_known_hosts_round_trip() {
		let instances = [
			CloudInstance::AzurePublic,
			CloudInstance::AzureChina,
			CloudInstance::AzureUsGovernment,
		];

		for instance in instances {
			let origin = instance.origin().expect("Well-known origin should parse.");

			assert_eq!(CloudInstance::from_url(&origin), instance);
		}
	}

	#[test]
	fn custom_origin_drops_path() {
		let url = Url::parse("http://127.0.0.1:8080/tenant/oauth2?x=1")
			.expect("Custom URL fixture should parse.");
		let instance = CloudInstance::from_url(&url);

		assert_eq!(
			instance.origin().expect("Custom origin should resolve.").as_str(),
			"http://127.0.0.1:8080/"
		);
		assert_eq!(instance.host(), Some("127.0.0.1"));
	}

	#[test]
	fn custom_origins_must_be_https_or_loopback() {
		for raw in ["http://login.example.com/", "ftp://login.example.com/"] {
			let url = Url::parse(raw).expect("Custom URL fixture should parse.");

			assert!(matches!(
				CloudInstance::Custom(url).origin(),
				Err(AuthorityError::InvalidUri { reason: "scheme must be https", .. })
			));
		}

		let url = Url::parse("https://login.example.com:8443/").expect("URL should parse.");

		assert!(CloudInstance::Custom(url).origin().is_ok());
	}
}
