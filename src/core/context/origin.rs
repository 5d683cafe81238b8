/// Extracts the calling origin from an inbound request,
/// e.g. an application name carried in a header.
pub trait OriginParser<R: ?Sized> {
    fn parse_origin(&self, request: &R) -> String;
}

/// Treats every request as coming from an unknown origin.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultOriginParser;

impl<R: ?Sized> OriginParser<R> for DefaultOriginParser {
    fn parse_origin(&self, _request: &R) -> String {
        String::new()
    }
}

impl<R: ?Sized, F> OriginParser<R> for F
where
    F: Fn(&R) -> String,
{
    fn parse_origin(&self, request: &R) -> String {
        self(request)
    }
}
