mod diagnostics;
mod lifecycle;
mod queries;
