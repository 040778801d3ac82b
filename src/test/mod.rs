mod categorize;
mod executor;
mod parser;
mod resolver;
