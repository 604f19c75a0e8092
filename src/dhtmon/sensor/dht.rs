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

use crate::sensor::core::{DataPin, Humidity, Sensor, SensorError, SensorErrorKind, TemperatureCelsius};
use rppal::gpio::Mode;
use serde::Deserialize;
use std::fmt::{self, Debug, Formatter};
use std::thread;
use std::time::Duration;

pub(crate) const DHT_MAX_COUNT: u32 = 32_000;
pub(crate) const DHT_PULSES: usize = 41;
pub(crate) const DATA_SIZE: usize = 5;

/// Supported sensor models. Both use the same single-wire protocol but encode
/// temperature and humidity differently.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Model {
    Dht11,
    Dht22,
}

impl Model {
    pub fn name(&self) -> &'static str {
        match self {
            Model::Dht11 => "DHT11",
            Model::Dht22 => "DHT22",
        }
    }

    /// How long the host holds the data line low to request a reading.
    fn start_signal(&self) -> Duration {
        match self {
            // Datasheet minimum is 18ms
            Model::Dht11 => Duration::from_millis(20),
            // Datasheet minimum is 1ms
            Model::Dht22 => Duration::from_millis(20),
        }
    }
}

impl Default for Model {
    fn default() -> Self {
        Model::Dht11
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self.name(), f)
    }
}

/// Cycle counts of how long the sensor data pin spent low and high states.
///
/// There are 40 low/high transitions we count cycles for. These counts are
/// used to read 40 bits of information from the sensor.
#[derive(Debug)]
struct Pulses {
    // We store counts for 41 transitions but don't use the first low/high transition
    counts: [u32; DHT_PULSES * 2],
}

impl Pulses {
    /// Count the number of cycles the given pin spends in the low and high states for
    /// 40 low/high transitions.
    ///
    /// An error will be returned if the pin didn't transition in time. The read will have
    /// to be retried in this case.
    ///
    /// NOTE: This method assumes the pin has already been prepared for reading by sending
    /// the start signal.
    fn from_data_pin(pin: &dyn DataPin) -> Result<Self, SensorError> {
        // Twice as many entries as pulses we measure: the number of cycles the pin spent
        // low and then high for each pulse.
        let mut counts: [u32; DHT_PULSES * 2] = [0; DHT_PULSES * 2];

        // Low and high counts share the same array. Each iteration advances by two entries,
        // the low count goes in the even entry and the high count at (i + 1).
        //
        // Counts stop at DHT_MAX_COUNT which is far more cycles than we expect to see in
        // practice (normal number of cycles at high or low is 50 - 200). This acts as a
        // timeout while waiting for the pin to change state, and the read will have to be
        // retried.
        for i in (0..counts.len()).step_by(2) {
            while pin.is_low() {
                counts[i] += 1;
                if counts[i] >= DHT_MAX_COUNT {
                    return Err(SensorError::KindMsg(
                        SensorErrorKind::ReadTimeout,
                        "timeout waiting for low pulse capture",
                    ));
                }
            }

            while pin.is_high() {
                counts[i + 1] += 1;
                if counts[i + 1] >= DHT_MAX_COUNT {
                    return Err(SensorError::KindMsg(
                        SensorErrorKind::ReadTimeout,
                        "timeout waiting for high pulse capture",
                    ));
                }
            }
        }

        tracing::trace!(message = "reading low/high pulse counts", counts = ?counts);
        Ok(Self { counts })
    }

    /// Return an iterator over 40 cycle counts for the pin in the low state.
    fn low(&self) -> impl ExactSizeIterator<Item = &u32> {
        // Start from the 3rd element (first valid low count), emitting only low counts.
        // The first low/high transition is the sensor's response signal, not data, and
        // the pin starts low so its first count is always zero.
        self.counts.iter().skip(2).step_by(2)
    }

    /// Return an iterator over 40 cycle counts for the pin in the high state.
    fn high(&self) -> impl ExactSizeIterator<Item = &u32> {
        // Start from the 4th element (first valid high count), emitting only high counts.
        self.counts.iter().skip(3).step_by(2)
    }
}

/// Bytes read from a sensor, computed from high/low pulse cycle counts.
///
/// Bytes read make up temperature data, humidity data, and a checksum to ensure
/// the reading is valid. If valid, the reading can be decoded into a temperature
/// and humidity according to the sensor model.
#[derive(Debug)]
struct Reading {
    bytes: [u8; DATA_SIZE],
}

impl Reading {
    fn from_pulses(pulses: &Pulses) -> Result<Self, SensorError> {
        let mut bytes: [u8; DATA_SIZE] = [0; DATA_SIZE];

        // The average low cycle count decides whether each high cycle count is a 0 bit
        // (shorter than the threshold) or a 1 bit (longer than the threshold). Both models
        // send 0 bits as a ~26us high pulse and 1 bits as a ~70us high pulse after a ~50us
        // low pulse.
        let threshold = pulses.low().sum::<u32>() / pulses.low().len() as u32;

        for (i, &v) in pulses.high().enumerate() {
            // 40 high cycle counts make 40 bits of data. Divide by eight to find the byte
            // this bit ends up in and shift that byte left, only the LSB is set each time.
            let index = i / 8;
            bytes[index] <<= 1;

            if v >= threshold {
                bytes[index] |= 1;
            }
        }

        // Byte five is a checksum of the first four bytes, reject data that was
        // corrupted on the wire.
        Self::checksum_bytes(&bytes)?;
        Ok(Reading { bytes })
    }

    fn checksum_bytes(bytes: &[u8; DATA_SIZE]) -> Result<(), SensorError> {
        // From the DHT11 and DHT22 datasheets, byte five is the last 8 bits of
        // "8 bit integral RH data + 8 bit decimal RH data + 8 bit integral T data +
        // 8 bit decimal T data". The sum may overflow a byte, only the low bits count.
        let expected = bytes[4];
        let computed = ((bytes[0] as u16 + bytes[1] as u16 + bytes[2] as u16 + bytes[3] as u16) & 0xFF) as u8;

        tracing::debug!(
            message = "computing checksum for sensor data",
            computed = computed,
            expected = expected
        );

        if computed != expected {
            Err(SensorError::CheckSum(expected, computed))
        } else {
            Ok(())
        }
    }

    /// Interpret the bytes of this reading according to the encoding used by `model`.
    fn decode(&self, model: Model) -> (TemperatureCelsius, Humidity) {
        let (temp_raw, humidity_raw, negative) = match model {
            Model::Dht11 => {
                // See https://www.mouser.com/datasheet/2/758/DHT11-Technical-Data-Sheet-Translated-Version-1143054.pdf
                // first byte is integral humidity, second is the decimal part (always zero
                // on most parts). Third byte is integral temperature, the low nibble of the
                // fourth is a single decimal digit and its highest bit indicates sign.
                let humidity_raw = self.bytes[0] as u16 * 10 + self.bytes[1] as u16;
                let temp_raw = self.bytes[2] as u16 * 10 + (self.bytes[3] & 0b0000_1111) as u16;
                (temp_raw, humidity_raw, self.bytes[3] & 0b1000_0000 > 0)
            }
            Model::Dht22 => {
                // See https://cdn-shop.adafruit.com/datasheets/Digital+humidity+and+temperature+sensor+AM2302.pdf
                // first two bytes are humidity as a u16 * 10
                let humidity_raw = (self.bytes[0] as u16) * 256 /* shift left 8 bits */ + self.bytes[1] as u16;
                // second two bytes are temperature as a u16 * 10 with the highest bit indicating sign
                let temp_raw =
                    ((self.bytes[2] & 0b0111_1111) as u16) * 256 /* shift left 8 bits */ + self.bytes[3] as u16;
                (temp_raw, humidity_raw, self.bytes[2] & 0b1000_0000 > 0)
            }
        };

        let humidity_dec = humidity_raw as f64 / 10.0;
        let mut temp_dec = temp_raw as f64 / 10.0;
        if negative {
            temp_dec = -temp_dec;
        }

        let humidity = Humidity::from(humidity_dec);
        let temperature = TemperatureCelsius::from(temp_dec);

        tracing::debug!(
            message = "parsed sensor data",
            model = %model,
            raw_temperature = temp_raw,
            raw_humidity = humidity_raw,
            temperature = %temperature,
            humidity = %humidity
        );

        (temperature, humidity)
    }
}

/// Read temperature in degrees celsius and relative humidity from a DHT11 or
/// DHT22 sensor connected to a single data pin.
pub struct DhtSensor {
    model: Model,
    pin: Box<dyn DataPin + Send + Sync + 'static>,
}

impl DhtSensor {
    pub fn from_pin<T>(model: Model, pin: T) -> Self
    where
        T: DataPin + Send + Sync + 'static,
    {
        Self {
            model,
            pin: Box::new(pin),
        }
    }

    fn prepare_for_read(&mut self) {
        // Host needs to set the sensor:
        // * high to start the read process, waking the sensor up from low-power mode
        // * low long enough for the sensor to detect the start signal
        // * high for 20-40us to then wait for the sensor's response
        self.pin.set_mode(Mode::Output);
        self.pin.set_high();
        thread::sleep(Duration::from_millis(10));
        self.pin.set_low();
        thread::sleep(self.model.start_signal());
        self.pin.set_high();
        thread::sleep(Duration::from_micros(30));
        self.pin.set_mode(Mode::Input);
    }
}

impl Sensor for DhtSensor {
    /// Read temperature and humidity from the sensor or return an error if the
    /// read failed with details about what caused the read to fail.
    fn read(&mut self) -> Result<(TemperatureCelsius, Humidity), SensorError> {
        self.prepare_for_read();
        let pulses = Pulses::from_data_pin(self.pin.as_ref())?;
        let data = Reading::from_pulses(&pulses)?;
        Ok(data.decode(self.model))
    }
}

impl Debug for DhtSensor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DhtSensor")
            .field("model", &self.model)
            .field("pin", &self.pin.pin())
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::{DhtSensor, Model, Pulses, Reading, DATA_SIZE};
    use crate::sensor::core::{Humidity, Sensor, SensorError, SensorErrorKind, TemperatureCelsius};
    use crate::sensor::test::{FixedDataPin, MockDataPin};

    fn with_checksum(mut bytes: [u8; DATA_SIZE]) -> [u8; DATA_SIZE] {
        bytes[4] = ((bytes[0] as u16 + bytes[1] as u16 + bytes[2] as u16 + bytes[3] as u16) & 0xFF) as u8;
        bytes
    }

    #[test]
    fn test_pulses_timeout() {
        let pin = FixedDataPin::stuck();
        let res = Pulses::from_data_pin(&pin);

        assert!(res.is_err());
        assert_eq!(SensorErrorKind::ReadTimeout, res.unwrap_err().kind());
    }

    #[test]
    fn test_pulses_nop() {
        let pin = FixedDataPin::nop();
        let res = Pulses::from_data_pin(&pin);

        assert!(res.is_ok());
    }

    #[test]
    fn test_reading_checksum_valid() {
        let bytes = with_checksum([45, 0, 22, 3, 0]);
        assert_eq!(70, bytes[4]);

        let res = Reading::checksum_bytes(&bytes);
        assert!(res.is_ok())
    }

    #[test]
    fn test_reading_checksum_wraps() {
        let bytes = [0xFF, 0x01, 0x00, 0x00, 0x00];
        let res = Reading::checksum_bytes(&bytes);
        assert!(res.is_ok())
    }

    #[test]
    fn test_reading_checksum_invalid() {
        let bytes = [45, 0, 22, 3, 0];
        let res = Reading::checksum_bytes(&bytes);

        match res.unwrap_err() {
            SensorError::CheckSum(expected, got) => {
                assert_eq!(0, expected);
                assert_eq!(70, got);
            }
            other => panic!("Unexpected error: {}", other),
        }
    }

    #[test]
    fn test_dht11_decode_positive_temp() {
        let (t, h) = Reading {
            bytes: [45, 0, 22, 3, 0],
        }
        .decode(Model::Dht11);

        assert_eq!(TemperatureCelsius::from(22.3), t);
        assert_eq!(Humidity::from(45.0), h);
    }

    #[test]
    fn test_dht11_decode_negative_temp() {
        let (t, h) = Reading {
            bytes: [30, 2, 5, 0b1000_0111, 0],
        }
        .decode(Model::Dht11);

        assert_eq!(TemperatureCelsius::from(-5.7), t);
        assert_eq!(Humidity::from(30.2), h);
    }

    #[test]
    fn test_dht22_decode_positive_temp() {
        // Example data, from the datasheet: https://cdn-shop.adafruit.com/datasheets/Digital+humidity+and+temperature+sensor+AM2302.pdf
        let (t, h) = Reading {
            bytes: [0b0000_0010, 0b1000_1100, 0b0000_0001, 0b0101_1111, 0],
        }
        .decode(Model::Dht22);

        assert_eq!(TemperatureCelsius::from(35.1), t);
        assert_eq!(Humidity::from(65.2), h);
    }

    #[test]
    fn test_dht22_decode_negative_temp() {
        let (t, h) = Reading {
            bytes: [0b0000_0010, 0b1000_1100, 0b1000_0000, 0b0110_0101, 0],
        }
        .decode(Model::Dht22);

        assert_eq!(TemperatureCelsius::from(-10.1), t);
        assert_eq!(Humidity::from(65.2), h);
    }

    #[test]
    fn test_dht11_sensor_read_valid() {
        let pin = MockDataPin::new(with_checksum([45, 0, 22, 0, 0]));
        let mut sensor = DhtSensor::from_pin(Model::Dht11, pin);
        let (t, h) = sensor.read().unwrap();

        assert_eq!(TemperatureCelsius::from(22.0), t);
        assert_eq!(Humidity::from(45.0), h);
    }

    #[test]
    fn test_dht22_sensor_read_valid() {
        let pin = MockDataPin::new([0b0000_0010, 0b1000_1100, 0b0000_0001, 0b0101_1111, 0b1110_1110]);
        let mut sensor = DhtSensor::from_pin(Model::Dht22, pin);
        let (t, h) = sensor.read().unwrap();

        assert_eq!(TemperatureCelsius::from(35.1), t);
        assert_eq!(Humidity::from(65.2), h);
    }

    #[test]
    fn test_sensor_read_invalid_checksum() {
        let pin = MockDataPin::new([45, 0, 22, 0, 0]);
        let mut sensor = DhtSensor::from_pin(Model::Dht11, pin);
        let res = sensor.read();

        assert!(res.is_err());
        assert_eq!(SensorErrorKind::Checksum, res.unwrap_err().kind());
    }

    #[test]
    fn test_sensor_debug_includes_model() {
        let sensor = DhtSensor::from_pin(Model::Dht22, FixedDataPin::nop());
        let out = format!("{:?}", sensor);

        assert!(out.contains("Dht22"));
        assert!(out.contains("pin: 0"));
    }

    #[test]
    fn test_model_names() {
        assert_eq!("DHT11", Model::Dht11.to_string());
        assert_eq!("DHT22", Model::Dht22.name());
        assert_eq!(Model::Dht11, Model::default());
    }
}
