mod classifier;
mod helpers;
mod language;
