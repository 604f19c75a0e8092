// dhtmon - DHT sensor monitor with serial commands, indicator LEDs, and LCD output
//
// Copyright 2021 Nick Pillitteri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

use crate::sensor::{Humidity, Sensor, SensorError, SensorErrorKind, TemperatureUnit};
use std::fmt::{self, Formatter};

/// One temperature and humidity reading, with temperature in the unit it will
/// be reported in.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Sample {
    temperature: f64,
    unit: TemperatureUnit,
    humidity: Humidity,
}

impl Sample {
    pub fn new(temperature: f64, unit: TemperatureUnit, humidity: Humidity) -> Self {
        Self {
            temperature,
            unit,
            humidity,
        }
    }

    /// Read the sensor and convert the result to a `Sample` in the given unit.
    ///
    /// A sample where either value is NaN is treated the same as a failed read.
    pub fn acquire(sensor: &mut dyn Sensor, unit: TemperatureUnit) -> Result<Self, SensorError> {
        let (temperature, humidity) = sensor.read()?;
        let converted = unit.convert(temperature);

        if converted.is_nan() {
            return Err(SensorError::KindMsg(
                SensorErrorKind::NotANumber,
                "temperature reading was not a number",
            ));
        }

        if f64::from(humidity).is_nan() {
            return Err(SensorError::KindMsg(
                SensorErrorKind::NotANumber,
                "humidity reading was not a number",
            ));
        }

        Ok(Self::new(converted, unit, humidity))
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    pub fn unit(&self) -> TemperatureUnit {
        self.unit
    }

    pub fn humidity(&self) -> f64 {
        self.humidity.into()
    }
}

impl fmt::Display for Sample {
    /// Report line written to the text channel, two decimal places for each value.
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Temperature: {:.2} {}, Humidity: {:.2}%",
            self.temperature,
            self.unit,
            self.humidity()
        )
    }
}

#[cfg(test)]
mod test {
    use super::Sample;
    use crate::sensor::{Humidity, SensorErrorKind, TemperatureCelsius, TemperatureUnit};
    use crate::test::FakeSensor;

    #[test]
    fn test_report_line_fahrenheit() {
        let sample = Sample::new(72.0, TemperatureUnit::Fahrenheit, Humidity::from(45.0));
        assert_eq!("Temperature: 72.00 \u{00B0}F, Humidity: 45.00%", sample.to_string());
    }

    #[test]
    fn test_report_line_celsius_negative() {
        let sample = Sample::new(-5.25, TemperatureUnit::Celsius, Humidity::from(30.1));
        assert_eq!("Temperature: -5.25 \u{00B0}C, Humidity: 30.10%", sample.to_string());
    }

    #[test]
    fn test_acquire_converts_unit() {
        let sensor = FakeSensor::new();
        sensor.push_ok(TemperatureCelsius::from(100.0), Humidity::from(45.0));

        let sample = Sample::acquire(&mut sensor.clone(), TemperatureUnit::Fahrenheit).unwrap();
        assert_eq!(212.0, sample.temperature());
        assert_eq!(45.0, sample.humidity());
        assert_eq!(TemperatureUnit::Fahrenheit, sample.unit());
    }

    #[test]
    fn test_acquire_nan_temperature() {
        let sensor = FakeSensor::new();
        sensor.push_ok(TemperatureCelsius::from(f64::NAN), Humidity::from(45.0));

        let res = Sample::acquire(&mut sensor.clone(), TemperatureUnit::Fahrenheit);
        assert_eq!(SensorErrorKind::NotANumber, res.unwrap_err().kind());
    }

    #[test]
    fn test_acquire_nan_humidity() {
        let sensor = FakeSensor::new();
        sensor.push_ok(TemperatureCelsius::from(21.0), Humidity::from(f64::NAN));

        let res = Sample::acquire(&mut sensor.clone(), TemperatureUnit::Celsius);
        assert_eq!(SensorErrorKind::NotANumber, res.unwrap_err().kind());
    }

    #[test]
    fn test_acquire_read_error() {
        let sensor = FakeSensor::new();
        sensor.push_err(SensorErrorKind::Checksum);

        let res = Sample::acquire(&mut sensor.clone(), TemperatureUnit::Celsius);
        assert_eq!(SensorErrorKind::Checksum, res.unwrap_err().kind());
    }
}
