pub mod audit {

    pub const LOGIN_EVENT: &str = "auth.login";

    pub const APPROVAL_EVENT: &str = "membership.approval";

    pub const INTEGRITY_EVENT: &str = "store.integrity";

    pub const RATE_LIMIT_EVENT: &str = "rate_limit.denied";
}

pub mod session {

    /// Session key holding the authenticated account id.
    pub const ACCOUNT_ID: &str = "account_id";
}

pub mod limits {

    pub const DEFAULT_MEMBER_PAGE_SIZE: u64 = 50;

    /// Largest accepted picture upload in bytes.
    pub const MAX_PICTURE_BYTES: usize = 5 * 1024 * 1024;
}
