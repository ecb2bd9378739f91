//! Weather tool — stub that returns mock weather data.
//!
//! In production this would call a real weather API. The stub derives its
//! numbers from a hash of the location so repeated lookups agree.

use async_trait::async_trait;
use delve_core::error::ToolError;
use delve_core::tool::{Tool, ToolArgs, string_arg};

pub struct WeatherLookupTool;

#[async_trait]
impl Tool for WeatherLookupTool {
    fn name(&self) -> &str {
        "get_weather"
    }

    fn description(&self) -> &str {
        "get_weather(location: str) -> str: Gets current weather information for a location."
    }

    async fn execute(&self, arguments: &ToolArgs) -> Result<String, ToolError> {
        let location = string_arg(arguments, "location");
        let weather = mock_weather(&location);
        serde_json::to_string_pretty(&weather).map_err(|e| ToolError::ExecutionFailed {
            tool_name: "get_weather".into(),
            reason: e.to_string(),
        })
    }
}

#[derive(serde::Serialize)]
struct WeatherReport {
    location: String,
    temperature: String,
    condition: String,
    humidity: String,
    wind_speed: String,
    description: String,
}

fn mock_weather(location: &str) -> WeatherReport {
    let hash: u32 = location
        .bytes()
        .fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u32));

    let conditions = [
        "sunny",
        "cloudy",
        "rainy",
        "partly cloudy",
        "windy",
        "foggy",
    ];

    let condition = conditions[(hash as usize / 7) % conditions.len()];
    let temp = 15 + hash % 20; // 15..35 °C
    let humidity = 30 + hash % 51; // 30..=80 %
    let wind_speed = 5 + (hash / 3) % 21; // 5..=25 km/h

    WeatherReport {
        location: location.to_string(),
        temperature: format!("{temp}°C"),
        condition: condition.to_string(),
        humidity: format!("{humidity}%"),
        wind_speed: format!("{wind_speed} km/h"),
        description: format!(
            "Current weather in {location}: {condition} with temperature of {temp}°C, humidity at {humidity}%, and wind speed of {wind_speed} km/h."
        ),
    }
}
