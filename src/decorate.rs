//! Request decoration: attaching the current access credential before dispatch.

// self
use crate::{config::AuthHeader, credential::TokenSecret, http::ApiRequest};

/// Describes how to attach an access credential to an outbound request.
///
/// Decoration is synchronous and side-effect free; the dispatcher reads the credential from the
/// store beforehand so decorators never block on storage or network I/O.
pub trait RequestDecorator
where
	Self: Send + Sync,
{
	/// Returns `request` carrying `access`, or unchanged when there is no credential.
	fn decorate(&self, request: ApiRequest, access: Option<&TokenSecret>) -> ApiRequest;
}

/// Writes the access credential into a single header (`Authorization: Bearer <token>` by
/// default), replacing any value already present under that name.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BearerDecorator {
	header: AuthHeader,
}
impl BearerDecorator {
	/// Creates a decorator for the provided header shape.
	pub fn new(header: AuthHeader) -> Self {
		Self { header }
	}

	/// Header shape used by this decorator.
	pub fn header(&self) -> &AuthHeader {
		&self.header
	}
}
impl RequestDecorator for BearerDecorator {
	fn decorate(&self, mut request: ApiRequest, access: Option<&TokenSecret>) -> ApiRequest {
		if let Some(token) = access {
			request.set_header(self.header.name.clone(), self.header.value_for(token.expose()));
		}

		request
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::_prelude::*;

	fn request() -> ApiRequest {
		ApiRequest::get(Url::parse("https://api.example.com/me").expect("Fixture URL should parse."))
	}

	#[test]
	fn attaches_bearer_header() {
		let decorator = BearerDecorator::default();
		let token = TokenSecret::new("access-1");
		let decorated = decorator.decorate(request(), Some(&token));

		assert_eq!(decorated.header("authorization"), Some("Bearer access-1"));
	}

	#[test]
	fn replaces_stale_header_on_redecoration() {
		let decorator = BearerDecorator::default();
		let first = decorator.decorate(request(), Some(&TokenSecret::new("old")));
		let second = decorator.decorate(first, Some(&TokenSecret::new("new")));

		assert_eq!(second.header("Authorization"), Some("Bearer new"));
		assert_eq!(second.headers.len(), 1);
	}

	#[test]
	fn leaves_request_untouched_without_credential() {
		let decorator = BearerDecorator::default();
		let decorated = decorator.decorate(request(), None);

		assert_eq!(decorated, request());
	}

	#[test]
	fn custom_header_without_scheme() {
		let decorator =
			BearerDecorator::new(AuthHeader { name: "X-Access-Token".into(), scheme: None });
		let decorated = decorator.decorate(request(), Some(&TokenSecret::new("raw")));

		assert_eq!(decorated.header("x-access-token"), Some("raw"));
		assert_eq!(decorated.header("authorization"), None);
	}
}
