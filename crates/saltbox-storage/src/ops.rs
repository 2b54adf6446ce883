use saltbox_protocol::{ErrorTag, Operation, Request, Response};
use subtle::ConstantTimeEq;

const MAX_ID_LEN: usize = 255;

/// A request's operands, checked against what its operation needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StoreOp<'a> {
    Create { digest: &'a str },
    Verify,
    Update { expected: &'a str, replacement: &'a str },
    Delete { expected: Option<&'a str> },
}

/// Parses `request` into a [`StoreOp`], or the `Malformed` response to send back.
pub(crate) fn parse_request(request: &Request) -> Result<StoreOp<'_>, Response> {
    validate_id("owner", request.owner()).map_err(|m| malformed(request, m))?;
    validate_id("key", request.key()).map_err(|m| malformed(request, m))?;

    let op = match request.operation() {
        Operation::Create => StoreOp::Create {
            digest: require(request, request.digest(), "digest")?,
        },
        Operation::Verify => StoreOp::Verify,
        Operation::Update => StoreOp::Update {
            expected: require(request, request.digest(), "digest")?,
            replacement: require(request, request.new_digest(), "newDigest")?,
        },
        Operation::Delete => StoreOp::Delete {
            expected: request.digest(),
        },
    };
    Ok(op)
}

/// Constant-time digest comparison for compare-and-swap checks.
pub(crate) fn digests_match(stored: &str, expected: &str) -> bool {
    stored.as_bytes().ct_eq(expected.as_bytes()).into()
}

pub(crate) fn not_found(request: &Request) -> Response {
    Response::failure(request, ErrorTag::NotFound, "no record for owner/key")
}

pub(crate) fn duplicate(request: &Request) -> Response {
    Response::failure(request, ErrorTag::Duplicate, "record already exists")
}

pub(crate) fn conflict(request: &Request) -> Response {
    Response::failure(
        request,
        ErrorTag::Conflict,
        "stored digest does not match expected digest",
    )
}

fn require<'a>(
    request: &Request,
    value: Option<&'a str>,
    field: &str,
) -> Result<&'a str, Response> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(malformed(
            request,
            format!("{} requires {field}", request.operation()),
        )),
    }
}

fn malformed(request: &Request, detail: String) -> Response {
    Response::failure(request, ErrorTag::Malformed, detail)
}

fn validate_id(field: &str, id: &str) -> Result<(), String> {
    if id.is_empty() {
        return Err(format!("{field} must not be empty"));
    }
    if id.len() > MAX_ID_LEN {
        return Err(format!("{field} longer than {MAX_ID_LEN} bytes"));
    }
    Ok(())
}
