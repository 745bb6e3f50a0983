use thiserror::Error;

/// http method tokens, in canonical table order
///
/// the discriminant is the wire index callers use to identify a method,
/// so the order here is stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum Method {
    Delete = 0,
    Get,
    Head,
    Post,
    Put,
    Connect,
    Options,
    Trace,
    Copy,
    Lock,
    MkCol,
    Move,
    PropFind,
    PropPatch,
    Search,
    Unlock,
    Bind,
    Rebind,
    Unbind,
    Acl,
    Report,
    MkActivity,
    Checkout,
    Merge,
    MSearch,
    Notify,
    Subscribe,
    Unsubscribe,
    Patch,
    Purge,
    MkCalendar,
    Link,
    Unlink,
}

/// the method table, indexed by [`Method::index`]
pub const METHODS: [Method; 33] = [
    Method::Delete,
    Method::Get,
    Method::Head,
    Method::Post,
    Method::Put,
    Method::Connect,
    Method::Options,
    Method::Trace,
    Method::Copy,
    Method::Lock,
    Method::MkCol,
    Method::Move,
    Method::PropFind,
    Method::PropPatch,
    Method::Search,
    Method::Unlock,
    Method::Bind,
    Method::Rebind,
    Method::Unbind,
    Method::Acl,
    Method::Report,
    Method::MkActivity,
    Method::Checkout,
    Method::Merge,
    Method::MSearch,
    Method::Notify,
    Method::Subscribe,
    Method::Unsubscribe,
    Method::Patch,
    Method::Purge,
    Method::MkCalendar,
    Method::Link,
    Method::Unlink,
];

impl Method {
    pub const fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Method> {
        METHODS.get(index).copied()
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Method::Delete => "DELETE",
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Connect => "CONNECT",
            Method::Options => "OPTIONS",
            Method::Trace => "TRACE",
            Method::Copy => "COPY",
            Method::Lock => "LOCK",
            Method::MkCol => "MKCOL",
            Method::Move => "MOVE",
            Method::PropFind => "PROPFIND",
            Method::PropPatch => "PROPPATCH",
            Method::Search => "SEARCH",
            Method::Unlock => "UNLOCK",
            Method::Bind => "BIND",
            Method::Rebind => "REBIND",
            Method::Unbind => "UNBIND",
            Method::Acl => "ACL",
            Method::Report => "REPORT",
            Method::MkActivity => "MKACTIVITY",
            Method::Checkout => "CHECKOUT",
            Method::Merge => "MERGE",
            Method::MSearch => "M-SEARCH",
            Method::Notify => "NOTIFY",
            Method::Subscribe => "SUBSCRIBE",
            Method::Unsubscribe => "UNSUBSCRIBE",
            Method::Patch => "PATCH",
            Method::Purge => "PURGE",
            Method::MkCalendar => "MKCALENDAR",
            Method::Link => "LINK",
            Method::Unlink => "UNLINK",
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown method token: {token}")]
pub struct UnknownMethod {
    token: String,
}

impl TryFrom<&[u8]> for Method {
    type Error = UnknownMethod;

    // the table is small, a linear scan over the canonical spellings is fine
    fn try_from(token: &[u8]) -> Result<Self, Self::Error> {
        METHODS
            .iter()
            .copied()
            .find(|method| method.as_str().as_bytes() == token)
            .ok_or_else(|| UnknownMethod { token: String::from_utf8_lossy(token).into_owned() })
    }
}
