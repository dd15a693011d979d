mod coalescing;
mod lifecycle;
mod logging;
mod scenarios;
