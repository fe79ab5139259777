mod browser;
mod email;
mod fetcher;
mod inference;
mod object_store;

pub use browser::ChromeBrowser;
pub use email::SmtpEmailSender;
pub use fetcher::ReqwestFetcher;
pub use inference::HttpInferenceInvoker;
pub use object_store::FsObjectStore;
