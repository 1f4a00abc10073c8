mod documents;
mod session;
