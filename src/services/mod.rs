pub mod auth_service;
pub use auth_service::{AuthError, AuthService, AuthenticatedAccount};

pub mod auth_service_impl;
pub use auth_service_impl::SeaOrmAuthService;

pub mod member_service;
pub use member_service::{MemberError, MemberService, Registration};

pub mod member_service_impl;
pub use member_service_impl::SeaOrmMemberService;

pub mod notifier;
pub use notifier::{LettreNotifier, NoopNotifier, NotificationTemplate, Notifier, NotifyError};
